use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

const APP_DIR: &str = "villain-couch";

pub fn config_file_path() -> Result<PathBuf> {
    let base = dirs::config_dir().context("unable to resolve config directory")?;
    Ok(base.join(APP_DIR).join("config.toml"))
}

pub fn database_file_path(database_file: &Path) -> Result<PathBuf> {
    if database_file.is_absolute() {
        return Ok(database_file.to_path_buf());
    }
    let base = dirs::data_dir().context("unable to resolve data directory")?;
    Ok(base.join(APP_DIR).join(database_file))
}
