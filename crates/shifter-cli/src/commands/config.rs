use anyhow::{Context, Result};

use shifter_core::config::ShifterConfig;
use shifter_infrastructure::ConfigService;

pub fn path(service: &ConfigService) {
    println!("{}", service.path().display());
}

pub fn show(config: &ShifterConfig) -> Result<()> {
    let mut shown = config.clone();
    if shown.backend.api_key.is_some() {
        shown.backend.api_key = Some("***".to_string());
    }
    let toml = toml::to_string_pretty(&shown).context("Failed to render configuration")?;
    print!("{}", toml);
    Ok(())
}
