pub mod npm_package;
pub mod templates;
pub mod wheel;

pub use npm_package::{
    BuiltPackage, PackageJson, PlatformPackages, build_platform_packages, build_root_package,
    platform_package_name,
};
pub use wheel::{WheelFile, build_wheel, wheel_filename};
