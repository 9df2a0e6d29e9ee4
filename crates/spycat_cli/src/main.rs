//! CLI smoke entry point.
//!
//! # Responsibility
//! - Wire config, logging, storage and services the way a server would.
//! - Print entity counts for quick local sanity checks.

use log::error;
use spycat_core::{
    init_logging, CallContext, CatService, CoreConfig, Database, HttpBreedDirectory,
    MissionService,
};
use std::process::ExitCode;
use std::sync::Arc;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("event=cli_run module=cli status=error error={message}");
            eprintln!("spycat_cli: {message}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), String> {
    let config = CoreConfig::from_env().map_err(|err| err.to_string())?;
    let log_dir = config.log_dir.as_ref().and_then(|dir| dir.to_str());
    init_logging(config.log_level, log_dir)?;

    let db = Database::open(&config.db_path, config.pool_size).map_err(|err| err.to_string())?;
    let breeds =
        HttpBreedDirectory::new(&config.breed_api_url).map_err(|err| err.to_string())?;
    let cats = CatService::new(db.clone(), Arc::new(breeds), config.timeouts);
    let missions = MissionService::new(db, config.timeouts);

    let ctx = CallContext::new("cli");
    let cat_count = cats.list_cats(&ctx).await.map_err(|err| err.to_string())?.len();
    let mission_list = missions
        .list_missions(&ctx)
        .await
        .map_err(|err| err.to_string())?;
    let active = mission_list.iter().filter(|mission| !mission.completed).count();

    println!("spycat_core version={}", spycat_core::core_version());
    println!("db={}", config.db_path.display());
    println!("cats={cat_count}");
    println!("missions={} active={}", mission_list.len(), active);
    Ok(())
}
