//! Layered TOML settings plus the command line that selects them.

mod cli;
pub use clap::Parser;
pub use cli::*;

mod settings;
pub use settings::*;
