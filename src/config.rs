//! Layered configuration: defaults, then a TOML file, then environment
//! variables, merged via `figment`.

use crate::cache::{Format, PathLayout, Retention};
use crate::error::ConfigError;
use figment::providers::{Env, Format as _, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheConfig {
    pub directory: Option<PathBuf>,
    pub format: String,
    pub hierarchical_path: bool,
    pub retain_in_memory: u8,
}

fn default_cache() -> CacheConfig {
    CacheConfig {
        directory: None,
        format: "binary".to_string(),
        hierarchical_path: true,
        retain_in_memory: 1,
    }
}

impl CacheConfig {
    pub fn format(&self) -> Format {
        match self.format.as_str() {
            "json" => Format::Json,
            _ => Format::Binary,
        }
    }

    pub fn layout(&self) -> PathLayout {
        if self.hierarchical_path {
            PathLayout::Hierarchical
        } else {
            PathLayout::Flat
        }
    }

    pub fn retention(&self) -> Retention {
        match self.retain_in_memory {
            0 => Retention::Never,
            2 => Retention::AfterFirstSave,
            _ => Retention::AfterInitialLoad,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexConfig {
    pub on_change: bool,
    pub initial_no_linkage: bool,
    pub track_dependency: u8,
    pub threads: usize,
    pub comments: u8,
}

fn default_index() -> IndexConfig {
    IndexConfig {
        on_change: false,
        initial_no_linkage: true,
        track_dependency: 1,
        threads: (num_cpus::get() / 2).max(1),
        comments: 1,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    pub max_num: usize,
}

fn default_session() -> SessionConfig {
    SessionConfig { max_num: 10 }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsConfig {
    pub on_open: i64,
    pub on_save: i64,
    pub on_change: i64,
}

fn default_diagnostics() -> DiagnosticsConfig {
    DiagnosticsConfig {
        on_open: 0,
        on_save: 0,
        on_change: 1000,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_cache")]
    pub cache: CacheConfig,
    #[serde(default = "default_index")]
    pub index: IndexConfig,
    #[serde(default = "default_session")]
    pub session: SessionConfig,
    #[serde(default = "default_diagnostics")]
    pub diagnostics: DiagnosticsConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            cache: default_cache(),
            index: default_index(),
            session: default_session(),
            diagnostics: default_diagnostics(),
        }
    }
}

impl Settings {
    /// Defaults, then an optional TOML file at `path`, then `CX_`-prefixed
    /// environment variables (double underscore maps to a nested-key
    /// dot).
    pub fn load_from(path: Option<&Path>) -> Result<Settings, ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(Settings::default()));
        if let Some(path) = path {
            if path.exists() {
                figment = figment.merge(Toml::file(path));
            }
        }
        figment = figment.merge(Env::prefixed("CX_").map(|k| k.as_str().replace("__", ".").into()));
        figment
            .extract()
            .map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(self).unwrap_or_default();
        std::fs::write(path, text)
    }
}

/// Ancestor-directory search for a workspace config file.
pub fn find_workspace_config(start: &Path, file_name: &str) -> Option<PathBuf> {
    let mut dir = Some(start);
    while let Some(d) = dir {
        let candidate = d.join(file_name);
        if candidate.exists() {
            return Some(candidate);
        }
        dir = d.parent();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_when_no_file_present() {
        let settings = Settings::load_from(None).unwrap();
        assert_eq!(settings.cache.format, "binary");
        assert!(settings.cache.hierarchical_path);
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cxgraph.toml");
        std::fs::write(&path, "[cache]\nformat = \"json\"\n").unwrap();
        let settings = Settings::load_from(Some(&path)).unwrap();
        assert_eq!(settings.cache.format, "json");
    }

    #[test]
    fn env_var_overrides_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cxgraph.toml");
        std::fs::write(&path, "[cache]\nformat = \"json\"\n").unwrap();
        unsafe {
            std::env::set_var("CX_CACHE__FORMAT", "binary");
        }
        let settings = Settings::load_from(Some(&path)).unwrap();
        unsafe {
            std::env::remove_var("CX_CACHE__FORMAT");
        }
        assert_eq!(settings.cache.format, "binary");
    }

    #[test]
    fn find_workspace_config_walks_ancestors() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a/b/c");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join(".cxgraph.toml"), "").unwrap();
        let found = find_workspace_config(&nested, ".cxgraph.toml").unwrap();
        assert_eq!(found, dir.path().join(".cxgraph.toml"));
    }
}
