//! Mongo Holder - connectivity check
//!
//! Connects with the configured options, then lists the database's
//! collections.

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mongo_holder::{config::Args, db::DocumentStore, MongoClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("mongo_holder={},info", log_level).into()),
        )
        .with(args.log_json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!args.log_json).then(tracing_subscriber::fmt::layer))
        .init();

    if let Err(e) = args.mongo.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("Database: {}", args.mongo.database);
    match &args.mongo.mongodb_uri {
        Some(_) => info!("MongoDB: from MONGODB_URI"),
        None => info!("MongoDB: {}", args.mongo.address_list().join(",")),
    }

    let client = match MongoClient::connect(&args.mongo).await {
        Ok(client) => client,
        Err(e) => {
            error!("MongoDB connection failed: {}", e);
            std::process::exit(1);
        }
    };

    let names = client.collection_names().await?;
    info!("{} collections in '{}'", names.len(), client.db_name());
    for name in names {
        println!("{}", name);
    }

    Ok(())
}
