//! Command-line interface definition for Roomkey
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for signing in and out of the booking API and for
//! sending authenticated requests to it.

use clap::{Parser, Subcommand};

/// Roomkey - hotel booking API client
///
/// Keeps a login session for the booking API and refreshes its access
/// token transparently when the server rejects it.
#[derive(Parser, Debug, Clone)]
#[command(name = "roomkey")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (default: config/roomkey.yaml)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Override the API base URL from config
    #[arg(long)]
    pub base_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for Roomkey
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Log in and store the session
    Login {
        /// Account username
        #[arg(short, long)]
        username: String,

        /// Account password
        #[arg(short, long, env = "ROOMKEY_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Create an account and store the session issued for it
    Register {
        /// Account username
        #[arg(short, long)]
        username: String,

        /// Contact email address
        #[arg(short, long)]
        email: String,

        /// Account password
        #[arg(short, long, env = "ROOMKEY_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Forget the stored session
    Logout,

    /// Show the logged-in user
    Whoami {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Send an authenticated request to the API
    Request {
        /// HTTP method (GET, POST, PUT, PATCH, DELETE)
        method: String,

        /// Path relative to the API base URL, e.g. /bookings
        path: String,

        /// JSON request body
        #[arg(short, long)]
        data: Option<String>,
    },
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
