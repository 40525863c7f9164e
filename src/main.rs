use mimalloc::MiMalloc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cfg = credstore::config::Config::from_env()?;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cfg.loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .with_target(false),
        )
        .init();

    info!(
        database_url = %cfg.database_url,
        proxy = %cfg.proxy.as_ref().map(|u| u.as_str()).unwrap_or("<none>"),
        loglevel = %cfg.loglevel,
        client_id = %cfg.oauth.client_id
    );

    let service = match credstore::bootstrap::open(&cfg).await {
        Ok(service) => service,
        Err(e @ credstore::StoreError::IncompatibleSchema { .. }) => {
            // Operator action required; refuse to start rather than migrate
            // secret-bearing columns.
            error!("{e}");
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };

    let records = service.store().list_all().await?;
    info!(count = records.len(), "credential store ready");

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, exiting");
    Ok(())
}
