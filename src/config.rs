//! Application configuration management.
//!
//! Settings are layered with figment, lowest priority first:
//!
//! 1. Built-in defaults ([`Config::default`])
//! 2. TOML file (`config.toml` in the platform config directory, or `--config`)
//! 3. Environment variables prefixed `DUPECATALOG_` (nested keys split on `__`)
//! 4. Command-line flags ([`Cli::apply_to`](crate::cli::Cli::apply_to))
//!
//! On first run a default `config.toml` is written so users have a file to
//! edit.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "DUPECATALOG_";

/// Hostname used when none can be detected.
const FALLBACK_COMPUTER_NAME: &str = "localhost";

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Catalog database file. Default: `catalog.db` in the platform data dir.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog_path: Option<PathBuf>,

    /// Name this computer is cataloged under. Default: the hostname.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub computer_name: Option<String>,

    /// Number of hashing threads.
    pub io_threads: usize,

    /// Follow symbolic links while scanning.
    pub follow_symlinks: bool,

    /// Skip hidden files and directories.
    pub skip_hidden: bool,

    /// Gitignore-style patterns excluded from scans.
    pub ignore_patterns: Vec<String>,

    /// Move deleted files to the system trash instead of unlinking them.
    pub use_trash: bool,

    /// Refuse to delete files whose size or mtime differ from the catalog.
    pub verify_before_delete: bool,

    /// Remove directories emptied by `dupes --delete` and `kill-from-pc --delete`.
    pub remove_empty_dirs: bool,

    /// Reconcile a subtree before resolving duplicates in it.
    pub refresh_before_resolve: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            catalog_path: None,
            computer_name: None,
            io_threads: 4,
            follow_symlinks: false,
            skip_hidden: false,
            ignore_patterns: Vec::new(),
            use_trash: false,
            verify_before_delete: true,
            remove_empty_dirs: true,
            refresh_before_resolve: true,
        }
    }
}

impl Config {
    /// Build the layered figment for `file`, without the CLI layer.
    #[must_use]
    pub fn figment(file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(file) = file {
            figment = figment.merge(Toml::file(file));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load configuration from `file`, or from the default location.
    ///
    /// When no file is given and the default file does not exist yet, it is
    /// created with the default settings.
    ///
    /// # Errors
    ///
    /// Fails on invalid TOML or values of the wrong type.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let path = match file {
            Some(p) => Some(p.to_path_buf()),
            None => {
                let default = default_config_path();
                if let Some(p) = &default {
                    if !p.exists() {
                        if let Err(e) = Self::default().save(p) {
                            log::warn!("Could not write default config {}: {e:#}", p.display());
                        }
                    }
                }
                default
            }
        };

        let config: Self = Self::figment(path.as_deref())
            .extract()
            .with_context(|| match &path {
                Some(p) => format!("invalid configuration in {}", p.display()),
                None => "invalid configuration".to_string(),
            })?;
        log::debug!("Loaded configuration: {config:?}");
        Ok(config)
    }

    /// Write the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Fails if the file or its directory cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("failed to serialize configuration")?;
        fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    /// The catalog file to open.
    ///
    /// # Errors
    ///
    /// Fails if no path is configured and no platform data dir exists.
    pub fn resolved_catalog_path(&self) -> Result<PathBuf> {
        match &self.catalog_path {
            Some(p) => Ok(p.clone()),
            None => default_catalog_path()
                .context("no catalog path configured and no data directory available"),
        }
    }

    /// The name this computer is cataloged under.
    #[must_use]
    pub fn resolved_computer_name(&self) -> String {
        self.computer_name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .or_else(sysinfo::System::host_name)
            .unwrap_or_else(|| FALLBACK_COMPUTER_NAME.to_string())
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "dupecatalog", "dupecatalog")
}

/// Default location of `config.toml`.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|d| d.config_dir().join("config.toml"))
}

/// Default location of the catalog database.
#[must_use]
pub fn default_catalog_path() -> Option<PathBuf> {
    project_dirs().map(|d| d.data_dir().join("catalog.db"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.io_threads, 4);
        assert!(!config.use_trash);
        assert!(config.verify_before_delete);
        assert!(config.remove_empty_dirs);
        assert!(config.refresh_before_resolve);
    }

    #[test]
    fn test_defaults_roundtrip_through_figment() {
        let config: Config = Figment::from(Serialized::defaults(Config::default()))
            .extract()
            .unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_then_load_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config {
            catalog_path: Some(PathBuf::from("/srv/catalog.db")),
            computer_name: Some("nas".to_string()),
            io_threads: 2,
            ignore_patterns: vec!["*.tmp".to_string()],
            ..Config::default()
        };
        config.save(&path).unwrap();

        let loaded: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(&path))
            .extract()
            .unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "io_threads = \"many\"").unwrap();

        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_computer_name_override() {
        let config = Config {
            computer_name: Some("hostA".to_string()),
            ..Config::default()
        };
        assert_eq!(config.resolved_computer_name(), "hostA");

        let blank = Config {
            computer_name: Some("  ".to_string()),
            ..Config::default()
        };
        assert!(!blank.resolved_computer_name().trim().is_empty());
    }

    #[test]
    fn test_explicit_catalog_path() {
        let config = Config {
            catalog_path: Some(PathBuf::from("/x/c.db")),
            ..Config::default()
        };
        assert_eq!(
            config.resolved_catalog_path().unwrap(),
            PathBuf::from("/x/c.db")
        );
    }
}
