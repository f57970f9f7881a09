//! Config command implementation - show the effective or example configuration

use anyhow::Result;
use std::path::PathBuf;

use crate::config::Config;

pub fn execute(config: &Config, example: bool, write: Option<PathBuf>) -> Result<()> {
    let selected = if example { Config::default() } else { config.clone() };

    match write {
        Some(path) => {
            selected.save_to_file(&path)?;
            log::info!("Configuration written to {}", path.display());
        }
        None => {
            let text = if example {
                Config::example_toml()?
            } else {
                toml::to_string_pretty(&selected)?
            };
            print!("{}", text);
        }
    }

    Ok(())
}
