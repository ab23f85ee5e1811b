use anyhow::Result;
use clap::{Parser, Subcommand};
use shared::domain::{Role, UserId, UserProfile};
use storage::{DocumentStore, Storage};
use tracing::info;

mod config;

use config::load_settings;

#[derive(Parser, Debug)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// One-shot copy of every record in the live store into a document
    /// store: read once, bulk-insert once, exit.
    Migrate {
        #[arg(long)]
        source_database_url: Option<String>,
        #[arg(long)]
        target_database_url: Option<String>,
    },
    /// Write a profile record, for local development.
    SeedUser {
        user_id: String,
        account_type: String,
        first_name: String,
        #[arg(long)]
        database_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let settings = load_settings();
    let cli = Cli::parse();

    match cli.command {
        Command::Migrate {
            source_database_url,
            target_database_url,
        } => {
            let source_url = source_database_url.unwrap_or(settings.database_url);
            let target_url = target_database_url.unwrap_or(settings.target_database_url);

            let source = Storage::new(&source_url).await?;
            let documents = source.export_documents().await?;
            if documents.is_empty() {
                info!("no data available in the source store");
                return Ok(());
            }

            let target = DocumentStore::new(&target_url).await?;
            let migrated = target.insert_many(&documents).await?;
            info!(migrated, "data migrated successfully");
        }
        Command::SeedUser {
            user_id,
            account_type,
            first_name,
            database_url,
        } => {
            let Some(role) = Role::parse(&account_type) else {
                anyhow::bail!(
                    "unknown account type '{account_type}' (expected donor, volunteer, or recipient)"
                );
            };

            let storage = Storage::new(&database_url.unwrap_or(settings.database_url)).await?;
            storage
                .put_profile(
                    &UserId::new(user_id.clone()),
                    &UserProfile {
                        account_type: Some(role),
                        first_name: Some(first_name),
                    },
                )
                .await?;
            println!("seeded user {user_id}");
        }
    }

    Ok(())
}
