//! Config command handlers.

use anyhow::{Context, Result};

use crate::config::Config;
use crate::paths;

pub fn path() -> Result<()> {
    println!("{}", paths::config_path().display());
    Ok(())
}

pub fn init() -> Result<()> {
    let config_path = paths::config_path();
    Config::init(&config_path).context("initialize config")?;
    println!("Created config at {}", config_path.display());
    Ok(())
}

pub fn set_model(model: &str) -> Result<()> {
    Config::save_model(model).context("save model")?;
    println!("Model set to {}", model);
    Ok(())
}
