pub mod npm_plugin;
pub mod pypi_plugin;

pub use npm_plugin::NpmPlugin;
pub use pypi_plugin::PyPiPlugin;
