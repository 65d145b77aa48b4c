use std::path::Path;

use anyhow::Context;
use chrono::Utc;
use parceldesk_db::{DemoDataset, JsonDocuments, RecordStore, SeedResult};
use serde_json::json;

use crate::commands::{async_runtime, load_config, open_database, CommandResult, Failure};

/// Loads `users.json` / `orders.json` from `data_dir`, or the demo dataset.
/// Records are upserted, so seeding twice is harmless.
pub fn run(data_dir: Option<&Path>) -> CommandResult {
    let config = match load_config("seed") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match async_runtime("seed") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = open_database(&config).await?;
        let store = RecordStore::sql(pool.clone());
        let loaded: Result<SeedResult, Failure> = load(&store, data_dir)
            .await
            .map_err(|error| ("seed_execution", format!("{error:#}"), 6u8));
        pool.close().await;
        loaded
    });

    let source = data_dir.map_or_else(|| "demo dataset".to_string(), |dir| dir.display().to_string());
    match result {
        Ok(seeded) => CommandResult::success_with(
            "seed",
            seed_message(&seeded, &source),
            Some(json!({"customers": seeded.customers, "orders": seeded.orders, "source": source})),
        ),
        Err(failure) => CommandResult::from_failure("seed", failure),
    }
}

async fn load(store: &RecordStore, data_dir: Option<&Path>) -> anyhow::Result<SeedResult> {
    match data_dir {
        Some(dir) => {
            let documents = JsonDocuments::read_dir(dir)
                .with_context(|| format!("reading seed documents from {}", dir.display()))?;
            documents.load(store).await.context("importing seed documents")
        }
        None => DemoDataset::load(store, Utc::now()).await.context("loading demo dataset"),
    }
}

fn seed_message(seeded: &SeedResult, source: &str) -> String {
    format!("seeded {} customers and {} orders from {source}", seeded.customers, seeded.orders)
}
