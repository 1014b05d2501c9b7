use crate::loader::LoadMode;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct LoaderConfig {
    #[serde(default = "LoaderConfig::default_bundle_list")]
    pub bundle_list: PathBuf,
    /// Bundle loaded at startup instead of the list's default bundle.
    #[serde(default)]
    pub startup_bundle: Option<String>,
    #[serde(default)]
    pub load_mode: LoadMode,
    #[serde(default = "LoaderConfig::default_log_filter")]
    pub log_filter: String,
}

#[derive(Debug, Clone, Default)]
pub struct LoaderConfigOverrides {
    pub bundle_list: Option<PathBuf>,
    pub startup_bundle: Option<String>,
    pub load_mode: Option<LoadMode>,
    pub log_filter: Option<String>,
}

impl LoaderConfig {
    fn default_bundle_list() -> PathBuf {
        PathBuf::from("config/bundles.json")
    }

    fn default_log_filter() -> String {
        "info".to_string()
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read config file {}", path.display()))?;
        let cfg = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(cfg)
    }

    /// Loads `path`, or returns the defaults together with the load error so
    /// the caller can report it once logging is up.
    pub fn load_or_fallback(path: impl AsRef<Path>) -> (Self, Option<anyhow::Error>) {
        match Self::load(path) {
            Ok(cfg) => (cfg, None),
            Err(err) => (Self::default(), Some(err)),
        }
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let (cfg, err) = Self::load_or_fallback(path);
        if let Some(err) = err {
            eprintln!("Config load error: {err:?}. Falling back to defaults.");
        }
        cfg
    }

    pub fn apply_overrides(&mut self, overrides: &LoaderConfigOverrides) {
        if let Some(path) = &overrides.bundle_list {
            self.bundle_list = path.clone();
        }
        if let Some(bundle) = &overrides.startup_bundle {
            self.startup_bundle = Some(bundle.clone());
        }
        if let Some(mode) = overrides.load_mode {
            self.load_mode = mode;
        }
        if let Some(filter) = &overrides.log_filter {
            self.log_filter = filter.clone();
        }
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            bundle_list: Self::default_bundle_list(),
            startup_bundle: None,
            load_mode: LoadMode::default(),
            log_filter: Self::default_log_filter(),
        }
    }
}

impl LoaderConfigOverrides {
    pub fn is_empty(&self) -> bool {
        self.bundle_list.is_none()
            && self.startup_bundle.is_none()
            && self.load_mode.is_none()
            && self.log_filter.is_none()
    }

    pub fn applied_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.bundle_list.is_some() {
            fields.push("bundle_list");
        }
        if self.startup_bundle.is_some() {
            fields.push("startup_bundle");
        }
        if self.load_mode.is_some() {
            fields.push("load_mode");
        }
        if self.log_filter.is_some() {
            fields.push("log_filter");
        }
        fields
    }
}
