pub mod command_executor;
pub mod token_manager;

pub use command_executor::{
    CommandError, CommandOutput, CommandRunner, GIT_TIMEOUT, NPM_PUBLISH_TIMEOUT, SafeCommandExecutor,
};
pub use token_manager::{CredentialSource, SecureTokenManager};
