use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use std::fs;
use std::path::Path;

mod models;
mod repositories;
pub mod services;
pub mod settings;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "config.toml")]
    config: String,
    #[arg(long, default_value = "log4rs.yaml")]
    log4rs: String,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run a single payout accrual cycle and exit.
    PayoutNow,
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init_logging(&args.log4rs).expect("Failed to initialize logging.");

    let config = settings::Settings::load(&args.config).expect("Could not load config file.");
    let conn = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.postgres.url)
        .await
        .expect("Could not connect to database.");

    sqlx::migrate!()
        .run(&conn)
        .await
        .expect("Could not run database migrations.");

    match args.command {
        Some(Command::PayoutNow) => {
            let scheduler = services::payout::PayoutScheduler::new(
                conn,
                config.payout.hour_utc,
                config.payout.page_size,
            );

            match scheduler.run_cycle_locked().await {
                Ok(Some(stats)) => log::info!("Payout cycle finished: {:?}", stats),
                Ok(None) => log::warn!("Payout cycle already running elsewhere, nothing done."),
                Err(e) => {
                    log::error!("Payout cycle failed: {}", e);
                    std::process::exit(1);
                }
            }
        }
        None => {
            log::info!("Starting services.");
            services::start_services(conn, config)
                .await
                .expect("Could not start services.");
        }
    }
}

fn init_logging(path: &str) -> Result<(), anyhow::Error> {
    if !Path::new("logs").exists() {
        fs::create_dir("logs")?;
    }

    match log4rs::init_file(path, Default::default()) {
        Ok(_) => {
            println!("[*] Logging initialized successfully.");
            Ok(())
        }
        Err(e) => {
            println!("[ERROR] Failed to initialize logging: {}", e);
            Err(anyhow::anyhow!("Could not initialize logging: {}", e))
        }
    }
}
