use crate::config::load_syncd_config;
use crate::core::start_syncd_with_config;
use ::config::shared::SyncdConfig;
use telemetry::init_tracing_with_mapping;
use tracing::error;

mod config;
mod core;

fn main() -> anyhow::Result<()> {
    // Load syncd config
    let syncd_config = load_syncd_config()?;

    // Initialize tracing with the mapping id so every entry carries it
    let _log_flusher =
        init_tracing_with_mapping(env!("CARGO_BIN_NAME"), Some(syncd_config.mapping.id))?;

    // We start the runtime.
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(syncd_config))?;

    Ok(())
}

async fn async_main(syncd_config: SyncdConfig) -> anyhow::Result<()> {
    // We start the daemon and catch any errors.
    if let Err(err) = start_syncd_with_config(syncd_config).await {
        error!("an error occurred in syncd: {err}");

        return Err(err);
    }

    Ok(())
}
