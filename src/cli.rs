//! Command line arguments for the `budget` binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug, Clone)]
#[command(name = "budget", about = "Command line client for the budget tracker API", version)]
pub struct Args {
    /// JSON configuration file
    #[arg(short, long, env = "BUDGET_CONFIG_PATH")]
    pub config: Option<PathBuf>,

    /// API base URL, overrides the configuration file
    #[arg(long, env = "BUDGET_API_URL")]
    pub api_url: Option<String>,

    /// Keep tokens in memory only
    #[arg(long)]
    pub ephemeral: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Log in and store the token pair
    Login {
        #[arg(short, long)]
        email: String,
        #[arg(short, long, env = "BUDGET_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create an account and log in
    Register {
        #[arg(short, long)]
        email: String,
        #[arg(short = 'n', long)]
        full_name: String,
        #[arg(short, long, env = "BUDGET_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Revoke the refresh token and forget local tokens
    Logout,
    /// Restore the stored session and print the current user
    Whoami,
    /// Statistics, recent activity and budget progress
    Dashboard {
        /// Bypass the shared request cache
        #[arg(long)]
        refresh: bool,
    },
    /// List transactions
    Transactions {
        #[arg(short, long, default_value_t = 20)]
        limit: u32,
        #[arg(long, default_value_t = 0)]
        skip: u32,
        #[arg(long)]
        category_id: Option<String>,
    },
    /// Month-by-month income and expenses
    Monthly {
        #[arg(short, long)]
        year: Option<i32>,
    },
    /// List categories with totals
    Categories,
    /// List budgets
    Budgets {
        /// Only budgets covering today
        #[arg(long)]
        active: bool,
    },
    /// Over-budget warnings
    Alerts,
}
