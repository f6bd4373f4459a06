pub mod command;
pub mod config;
pub mod host;
pub mod runner;

pub use command::CliCommand;
pub use config::CliConfig;
pub use host::CliHost;
pub use runner::run;
