//! Config Command
//!
//! Manage codetutor configuration.
//!
//! Usage:
//!   codetutor config show [-g] [-f json]
//!   codetutor config path
//!   codetutor config init [-g] [--force]

use crate::cli::ui::Output;
use crate::config::ConfigLoader;
use crate::types::Result;

/// Show configuration
pub fn show(global: bool, format: &str) -> Result<()> {
    if global {
        match ConfigLoader::global_config_path() {
            Some(path) if path.exists() => {
                let content = std::fs::read_to_string(&path)?;
                if format == "text" {
                    println!("# Global Config: {}\n", path.display());
                }
                println!("{}", content);
            }
            Some(_) => {
                println!("No global config found.");
                println!("Run 'codetutor config init --global' to create one.");
            }
            None => println!("Cannot determine global config directory."),
        }
        return Ok(());
    }

    // Merged effective config
    let config = ConfigLoader::load()?;
    println!("{}", ConfigLoader::render(&config, format)?);
    Ok(())
}

/// Show configuration paths
pub fn path() -> Result<()> {
    let config = ConfigLoader::load()?;
    ConfigLoader::show_path(&config);
    Ok(())
}

/// Write a default config file
pub fn init(global: bool, force: bool) -> Result<()> {
    let path = if global {
        ConfigLoader::init_global(force)?
    } else {
        ConfigLoader::init_project(force)?
    };

    let scope = if global { "global" } else { "project" };
    Output::new().success(&format!("Initialized {} configuration", scope));
    println!("  Config: {}", path.display());
    Ok(())
}
