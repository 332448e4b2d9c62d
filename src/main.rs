use std::path::PathBuf;

use actix_web::{
    middleware::{Compress, Logger},
    web, App, HttpServer,
};
use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::db::Database;

mod api;
mod cells;
mod config;
mod coverage;
mod db;
mod dedup;
mod dimensions;
mod error;
mod kabupaten;
mod model;
mod payload;
mod sector;
mod towers;

#[derive(Debug, Parser)]
struct Cli {
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP API.
    Serve { port: Option<u16> },
    /// Write the sector coverage of a kabupaten as GeoJSON.
    Coverage {
        kabupaten: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = config::load(cli.config.as_deref())?;
    error::expose_details(config.expose_error_details);

    let db = Database::connect(&config).await?;

    match cli.command {
        Command::Serve { port } => {
            let port = port.unwrap_or(config.http_port);
            info!(port, "server starting");
            HttpServer::new(move || {
                App::new()
                    .app_data(web::Data::new(db.clone()))
                    .wrap(Compress::default())
                    .wrap(api::cors())
                    .wrap(Logger::default())
                    .configure(api::configure)
            })
            .bind(("0.0.0.0", port))?
            .run()
            .await?;
        }

        Command::Coverage { kabupaten, output } => {
            coverage::export(&db, &kabupaten, output.as_deref()).await?
        }
    };

    Ok(())
}
