//! Configuration Loader (Figment-based)
//!
//! Loads and merges configuration from multiple sources using Figment:
//! 1. Built-in defaults (Serialized)
//! 2. Global config (~/.config/codetutor/config.toml)
//! 3. Project config (.codetutor/config.toml)
//! 4. Environment variables (CODETUTOR_* prefix, `__` separates sections)
//! 5. Legacy overrides (USE_CACHE, CACHE_FILE, LOG_DIR)

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::env::{EnvLookup, ProcessEnv};
use super::types::Config;
use crate::types::{Result, TutorError};

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with full resolution chain:
    /// defaults → global → project → env vars → legacy overrides
    pub fn load() -> Result<Config> {
        Self::load_with_env(&ProcessEnv)
    }

    /// Load configuration, reading the legacy overrides from `lookup`
    pub fn load_with_env(lookup: &dyn EnvLookup) -> Result<Config> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        if let Some(global_path) = Self::global_config_path()
            && global_path.exists()
        {
            debug!("Loading global config from: {}", global_path.display());
            figment = figment.merge(Toml::file(&global_path));
        }

        let project_path = Self::project_config_path();
        if project_path.exists() {
            debug!("Loading project config from: {}", project_path.display());
            figment = figment.merge(Toml::file(&project_path));
        }

        // e.g. CODETUTOR_LLM__ACTIVE_PROVIDER -> llm.active_provider
        figment = figment.merge(Env::prefixed("CODETUTOR_").split("__").lowercase(true));

        let mut config: Config = figment
            .extract()
            .map_err(|e| TutorError::Config(format!("Configuration error: {}", e)))?;

        config.apply_legacy_overrides(lookup);
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file only
    pub fn load_from_file(path: &Path) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .extract()
            .map_err(|e| TutorError::Config(format!("Configuration error: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    // =========================================================================
    // Path Management
    // =========================================================================

    /// Get path to global config directory (~/.config/codetutor/)
    pub fn global_dir() -> Option<PathBuf> {
        env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                env::var("HOME")
                    .ok()
                    .map(|home| PathBuf::from(home).join(".config"))
            })
            .map(|p| p.join("codetutor"))
    }

    /// Get path to global config file
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_dir().map(|dir| dir.join("config.toml"))
    }

    /// Get path to project config file
    pub fn project_config_path() -> PathBuf {
        Self::project_dir().join("config.toml")
    }

    /// Get project data directory
    pub fn project_dir() -> PathBuf {
        PathBuf::from(".codetutor")
    }

    // =========================================================================
    // Config Commands
    // =========================================================================

    /// Show config file paths
    pub fn show_path(config: &Config) {
        println!("Configuration paths:");
        println!();

        if let Some(global) = Self::global_config_path() {
            let exists = if global.exists() { "✓" } else { "✗" };
            println!("  Global:  {} {}", exists, global.display());
        } else {
            println!("  Global:  (not available)");
        }

        let project = Self::project_config_path();
        let exists = if project.exists() { "✓" } else { "✗" };
        println!("  Project: {} {}", exists, project.display());

        let cache = config.cache.resolved_path();
        let exists = if cache.exists() { "✓" } else { "✗" };
        println!("  Cache:   {} {}", exists, cache.display());
        println!("  Logs:    {}", config.logging.dir.display());
    }

    /// Render the effective configuration in `text` (TOML), `json` or `yaml`
    pub fn render(config: &Config, format: &str) -> Result<String> {
        match format {
            "json" => Ok(serde_json::to_string_pretty(config)?),
            "yaml" => serde_yaml::to_string(config).map_err(|e| TutorError::Config(e.to_string())),
            _ => Ok(toml::to_string_pretty(config)?),
        }
    }

    // =========================================================================
    // Initialization
    // =========================================================================

    /// Initialize global configuration
    pub fn init_global(force: bool) -> Result<PathBuf> {
        let global_dir = Self::global_dir().ok_or_else(|| {
            TutorError::config("Cannot determine global config directory")
        })?;

        fs::create_dir_all(&global_dir)?;

        let config_path = global_dir.join("config.toml");
        Self::write_default(&config_path, force)?;
        Ok(config_path)
    }

    /// Initialize project configuration
    pub fn init_project(force: bool) -> Result<PathBuf> {
        let project_dir = Self::project_dir();
        fs::create_dir_all(&project_dir)?;

        let config_path = Self::project_config_path();
        Self::write_default(&config_path, force)?;
        Ok(config_path)
    }

    fn write_default(path: &Path, force: bool) -> Result<()> {
        if path.exists() && !force {
            info!("Config exists: {}", path.display());
            return Ok(());
        }

        let body = toml::to_string_pretty(&Config::default())?;
        let content = format!(
            "# codetutor configuration\n# Environment overrides: CODETUTOR_<SECTION>__<KEY>, USE_CACHE, CACHE_FILE, LOG_DIR\n\n{}",
            body
        );
        fs::write(path, content)?;
        info!("Created config: {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_load_default_config() {
        Jail::expect_with(|jail| {
            let config_home = jail.directory().display().to_string();
            jail.set_env("XDG_CONFIG_HOME", &config_home);
            let config = ConfigLoader::load().map_err(|e| e.to_string())?;
            assert_eq!(config.version, "1.0");
            assert_eq!(config.llm.active_provider, "gemini");
            Ok(())
        });
    }

    #[test]
    fn test_project_file_adds_provider() {
        Jail::expect_with(|jail| {
            let config_home = jail.directory().display().to_string();
            jail.set_env("XDG_CONFIG_HOME", &config_home);
            jail.create_dir(".codetutor")?;
            jail.create_file(
                ".codetutor/config.toml",
                r#"
                [llm]
                active_provider = "openrouter-fast"

                [llm.providers.openrouter-fast]
                api_key_env = "OPENROUTER_API_KEY"
                default_model = "openrouter/google/gemini-flash-1.5"
                endpoint = "https://openrouter.ai/api/v1/chat/completions"
                "#,
            )?;

            let config = ConfigLoader::load().map_err(|e| e.to_string())?;
            assert_eq!(config.llm.active_provider, "openrouter-fast");
            // Built-in providers survive the merge
            assert!(config.llm.providers.contains_key("gemini"));
            assert!(config.llm.providers.contains_key("openrouter-fast"));
            Ok(())
        });
    }

    #[test]
    fn test_env_override() {
        Jail::expect_with(|jail| {
            let config_home = jail.directory().display().to_string();
            jail.set_env("XDG_CONFIG_HOME", &config_home);
            jail.set_env("CODETUTOR_LLM__ACTIVE_PROVIDER", "anthropic");
            jail.set_env("CODETUTOR_CONTEXT__MAX_TOKENS", "4096");
            let config = ConfigLoader::load().map_err(|e| e.to_string())?;
            assert_eq!(config.llm.active_provider, "anthropic");
            assert_eq!(config.context.max_tokens, 4096);
            Ok(())
        });
    }

    #[test]
    fn test_legacy_env_override() {
        Jail::expect_with(|jail| {
            let config_home = jail.directory().display().to_string();
            jail.set_env("XDG_CONFIG_HOME", &config_home);
            jail.set_env("USE_CACHE", "false");
            jail.set_env("CACHE_FILE", "custom_cache.json");
            let config = ConfigLoader::load().map_err(|e| e.to_string())?;
            assert!(!config.cache.enabled);
            assert_eq!(config.cache.path, Some(PathBuf::from("custom_cache.json")));
            Ok(())
        });
    }

    #[test]
    fn test_init_project_round_trips() {
        Jail::expect_with(|jail| {
            let config_home = jail.directory().display().to_string();
            jail.set_env("XDG_CONFIG_HOME", &config_home);
            let path = ConfigLoader::init_project(false).map_err(|e| e.to_string())?;
            assert!(path.exists());

            let config = ConfigLoader::load_from_file(&path).map_err(|e| e.to_string())?;
            assert_eq!(config.llm.providers.len(), 4);
            assert_eq!(
                config.llm.providers["anthropic"].options.api_version.as_deref(),
                Some("2023-06-01")
            );
            Ok(())
        });
    }

    #[test]
    fn test_render_formats() {
        let config = Config::default();
        let toml = ConfigLoader::render(&config, "text").unwrap();
        assert!(toml.contains("active_provider"));
        let json = ConfigLoader::render(&config, "json").unwrap();
        assert!(json.contains("\"active_provider\""));
        let yaml = ConfigLoader::render(&config, "yaml").unwrap();
        assert!(yaml.contains("active_provider:"));
    }
}
