use super::Parser;
use clap::Subcommand;

#[derive(Parser, Debug)]
#[command(name = "tokenward", about = "Client-side session and token lifecycle manager")]
pub struct Cli {
    #[arg(long, global = true)]
    pub settings: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show the persisted session and its derived state
    Status,
    /// Store the token pair handed out by a login
    Login {
        #[arg(long)]
        access_token: String,
        #[arg(long)]
        refresh_token: String,
        /// Epoch seconds or ISO datetime
        #[arg(long)]
        access_expiry: Option<String>,
        /// Epoch seconds or ISO datetime
        #[arg(long)]
        refresh_expiry: Option<String>,
    },
    /// Print a usable access token, refreshing first if needed
    Validate,
    /// Force a refresh
    Refresh,
    /// Keep the session fresh until Ctrl-C or until it ends
    Watch,
    /// Clear all tokens
    Logout,
}
