use std::any::Any;
use std::process::ExitCode;

use crate::cli::{Commands, OutputMode};
use crate::errors::AppResult;

pub trait CommandHandler: Send + Sync {
    fn execute(&self, mode: OutputMode, verbose: bool) -> AppResult<ExitCode>;
    fn as_any(&self) -> &dyn Any;
}

mod admin;
mod auth;
mod enroll;
mod identify;
mod records;

pub use admin::AdminHandler;
pub use auth::AuthHandler;
pub use enroll::EnrollHandler;
pub use identify::IdentifyHandler;
pub use records::{IdentitiesHandler, LogHandler};

/// Exit status for a well-formed request whose face did not match.
pub const REJECTED_EXIT_CODE: u8 = 3;

impl From<Commands> for Box<dyn CommandHandler> {
    fn from(command: Commands) -> Self {
        match command {
            Commands::Admin(cmd) => Box::new(AdminHandler::new(cmd)),
            Commands::Enroll(cmd) => Box::new(EnrollHandler::new(cmd)),
            Commands::Identify(args) => Box::new(IdentifyHandler::new(args)),
            Commands::Auth(args) => Box::new(AuthHandler::new(args)),
            Commands::Identities(args) => Box::new(IdentitiesHandler::new(args)),
            Commands::Log(args) => Box::new(LogHandler::new(args)),
        }
    }
}
