//! CLI commands

mod completions;
mod deploy;
mod distribute;
mod init;

pub use completions::CompletionsCommand;
pub use deploy::DeployCommand;
pub use distribute::DistributeCommand;
pub use init::InitCommand;
