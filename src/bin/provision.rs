//! Control-plane provisioning: schema migrations and password re-sealing.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sea_orm_migration::MigratorTrait;
use taxdesk::{
    config::ConfigLoader, db, migration::Migrator, repositories::TenantRegistry,
    secret_box::SecretBox, telemetry,
};

#[derive(Debug, Parser)]
#[command(name = "taxdesk-provision", about = "Provision the taxdesk control plane")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Apply pending control-plane migrations
    Migrate,
    /// Seal tenant database passwords still stored as plaintext
    SealPasswords,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::new()
        .load()
        .context("loading configuration")?;
    telemetry::init_tracing(&config).context("initializing tracing")?;

    let conn = db::init_pool(&config)
        .await
        .context("connecting to the control-plane database")?;

    match cli.command {
        Command::Migrate => {
            Migrator::up(&conn, None)
                .await
                .context("applying migrations")?;
            println!("control-plane migrations applied");
        }
        Command::SealPasswords => {
            let key = config.crypto_key().context("loading encryption key")?;
            let registry = TenantRegistry::new(Arc::new(conn), Arc::new(SecretBox::new(&key)));
            let report = registry
                .seal_plaintext_passwords()
                .await
                .context("sealing tenant passwords")?;
            println!(
                "examined {} tenant records, sealed {} plaintext passwords",
                report.examined, report.sealed
            );
        }
    }

    Ok(())
}
