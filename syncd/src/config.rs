use config::load_config;
use config::shared::SyncdConfig;

/// Loads the [`SyncdConfig`] and validates it.
pub fn load_syncd_config() -> anyhow::Result<SyncdConfig> {
    let config = load_config::<SyncdConfig>()?;
    config.validate()?;

    Ok(config)
}
