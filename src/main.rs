use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use budget_client::api::models::{Pagination, TransactionFilters, UserCreate, UserLogin};
use budget_client::config;
use budget_client::BudgetClient;

mod cli;

use cli::{Args, Command};

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file if it exists
    let env_file_path = dotenvy::dotenv().ok();

    // Initialize the tracing subscriber for structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            if cfg!(debug_assertions) {
                "budget_client=debug,budget=debug,warn".into()
            } else {
                "budget_client=info,budget=info,warn".into()
            }
        }))
        .with(tracing_subscriber::fmt::layer().with_target(true).with_writer(std::io::stderr))
        .init();

    match env_file_path {
        Some(path) => info!("Loaded environment variables from {}", path.display()),
        None => debug!("No .env file found. Using existing environment variables."),
    };

    let args = Args::parse();

    let mut config = config::load_config(args.config.as_deref()).await?;
    if let Some(url) = args.api_url {
        config.api_base_url = url;
    }
    if args.ephemeral {
        config.token_store_path = None;
    }
    debug!(api = %config.api_base_url, "Configuration loaded");

    let client = BudgetClient::new(config).context("Failed to build API client")?;
    let session = client.session();

    match args.command {
        Command::Login { email, password } => {
            let user = session.login(&UserLogin { email, password }).await?;
            info!(user_id = %user.id, "Logged in");
            print_json(&user)?;
        }
        Command::Register {
            email,
            full_name,
            password,
        } => {
            let user = session
                .register(&UserCreate {
                    email,
                    full_name,
                    password,
                })
                .await?;
            print_json(&user)?;
        }
        Command::Logout => {
            session.logout().await;
            println!("Logged out");
        }
        Command::Whoami => {
            let user = session.check_auth().await?;
            print_json(&user)?;
        }
        Command::Dashboard { refresh } => {
            session.check_auth().await?;
            let summary = client.dashboard().load(refresh).await?;
            client.metrics().log_metrics();
            print_json(&summary)?;
        }
        Command::Transactions {
            limit,
            skip,
            category_id,
        } => {
            let filters = TransactionFilters {
                limit: Some(limit),
                skip: Some(skip),
                category_id,
                ..Default::default()
            };
            print_json(&client.transactions().list(&filters).await?)?;
        }
        Command::Monthly { year } => {
            print_json(&client.transactions().monthly_spending(year).await?)?;
        }
        Command::Categories => {
            print_json(&client.categories().with_stats().await?)?;
        }
        Command::Budgets { active } => {
            let budgets = if active {
                client.budgets().active().await?
            } else {
                client.budgets().list(&Pagination::first_page()).await?
            };
            print_json(&budgets)?;
        }
        Command::Alerts => {
            print_json(&client.budgets().alerts().await?)?;
        }
    }

    Ok(())
}
