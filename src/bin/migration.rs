//! Runs the embedded database migrations against the configured database.

use anyhow::Context;
use bookflow_api::{config, db};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::load_config().context("failed to load configuration")?;
    config::init_tracing(&cfg.log_level, cfg.log_json);

    let pool = db::establish_connection_from_app_config(&cfg)
        .await
        .context("failed to connect to database")?;

    db::run_migrations(&pool)
        .await
        .context("failed to run migrations")?;

    db::close_pool(pool).await.context("failed to close pool")?;

    Ok(())
}
