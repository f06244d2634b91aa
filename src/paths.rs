use std::path::PathBuf;

use anyhow::{Context, Result};

pub fn default_config_file_path() -> Result<PathBuf> {
    let base = dirs::config_dir().context("unable to resolve config directory")?;
    Ok(base.join("teebook").join("teebook.env"))
}
