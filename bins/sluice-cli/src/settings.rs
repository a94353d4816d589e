//! Escrow configuration loading for the CLI.
//!
//! Layers, lowest precedence first: built-in defaults, an optional config
//! file (any format the `config` crate recognizes by extension), then
//! `SLUICE_*` environment variables (`SLUICE_MAX_BATCH_SIZE=20`,
//! `SLUICE_DISTRIBUTORS=aa..,bb..`).

use std::path::Path;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use sluice_core::config::EscrowConfig;

pub const ENV_PREFIX: &str = "SLUICE";

/// Load and validate the effective [`EscrowConfig`].
pub fn load(path: Option<&Path>) -> Result<EscrowConfig> {
    let mut builder = Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(File::from(path).required(true));
    }
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("distributors"),
    );

    let cfg: EscrowConfig = builder
        .build()
        .context("failed to read configuration")?
        .try_deserialize()
        .context("invalid configuration")?;
    cfg.validate().context("configuration rejected")?;
    Ok(cfg)
}
