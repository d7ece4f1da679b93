use clap::{Parser, Subcommand};

/// Scratchpost: test case management backend
#[derive(Parser)]
#[command(name = "scratchpost", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the API server
    Serve {
        /// Port to bind (overrides SCRATCHPOST_PORT)
        #[arg(short, long)]
        port: Option<u16>,
        /// Issue signed tokens instead of stored sessions
        #[arg(long)]
        jwt: bool,
    },

    /// Manage users
    User {
        #[command(subcommand)]
        command: UserCommands,
    },

    /// Apply database migrations and exit
    Migrate,
}

#[derive(Subcommand)]
pub enum UserCommands {
    /// Create a user directly in the database
    Create {
        #[arg(long)]
        username: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "SCRATCHPOST_NEW_USER_PASSWORD")]
        password: String,
    },
}
