pub mod cli;
pub mod load_config;
pub mod pipeline_client;

pub use cli::{run, Cli, Commands};
