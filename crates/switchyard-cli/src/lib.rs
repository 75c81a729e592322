pub mod cli;

pub use cli::{build_cli_command, BusbarChange, Cli, Commands, KindArg, OutputFormat};
