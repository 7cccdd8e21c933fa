use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use clap::Parser;
use sqlx::postgres::PgPoolOptions;

use roster_api::cache::CacheStore;
use roster_api::config::AppConfig;
use roster_api::db::run_migrations;
use roster_api::import::FileImportSpec;
use roster_api::services::RosterServices;

#[derive(Parser, Debug)]
#[command(
    name = "import_csv",
    about = "Import users and teams from local CSV files"
)]
struct Args {
    /// CSV files with `email,name` columns.
    #[arg(long, num_args = 1..)]
    users: Vec<PathBuf>,

    /// CSV files with `title,description` columns.
    #[arg(long, num_args = 1..)]
    teams: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let args = Args::parse();
    if args.users.is_empty() && args.teams.is_empty() {
        return Err("pass at least one --users or --teams file".into());
    }

    let mut specs = Vec::with_capacity(args.users.len() + args.teams.len());
    for (kind, paths) in [("users", &args.users), ("teams", &args.teams)] {
        for path in paths {
            let contents = std::fs::read(path)
                .map_err(|err| format!("failed to read {}: {}", path.display(), err))?;
            specs.push(FileImportSpec::new(kind, STANDARD.encode(contents)));
        }
    }

    let config = AppConfig::from_env()?;
    let database_url = std::env::var("DATABASE_URL")?;
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await?;
    run_migrations(&pool).await?;

    let cache = Arc::new(CacheStore::connect(&config.cache).await?);
    let services = RosterServices::postgres(pool, cache, config.cache.entity_ttl);

    let batch = services.importer.import_batch(specs).await?;
    writeln!(io::stdout(), "{}", serde_json::to_string_pretty(&batch)?)?;

    Ok(())
}
