pub mod bootstrap;
pub mod catalog;
pub mod cli;
pub mod load_config;
pub mod scheduler;
pub mod scm;
pub mod server;

pub use cli::{run, Cli, Commands};
