pub mod builder;
pub mod error;
pub mod json;
pub mod mock;
pub mod runner;


pub use builder::ProcessCommandBuilder;
pub use error::ProcessError;
pub use json::{parse_envelope, CommandAuthenticator, CommandProbe, JsonCommandRunner};
pub use mock::MockProcessRunner;
pub use runner::ProcessCommand;
pub use runner::{ExitStatus, ProcessOutput, ProcessRunner, TokioProcessRunner};
