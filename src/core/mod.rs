pub mod artifact;
pub mod config;
pub mod config_loader;
pub mod error;
pub mod platforms;
pub mod poll;
pub mod traits;

pub use artifact::*;
pub use config::*;
pub use config_loader::*;
pub use error::*;
pub use poll::*;
pub use traits::*;
