use crate::bundle::SceneId;
use crate::config::LoaderConfigOverrides;
use crate::loader::LoadMode;
use anyhow::{anyhow, bail, Result};
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CliOverrides {
    config: Option<PathBuf>,
    bundle_list: Option<PathBuf>,
    bundle: Option<String>,
    mode: Option<LoadMode>,
    open: Vec<SceneId>,
    log: Option<String>,
}

impl CliOverrides {
    pub fn parse_from_env() -> Result<Self> {
        Self::parse(env::args())
    }

    pub fn parse<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut overrides = CliOverrides::default();
        let mut iter = args.into_iter();
        let _ = iter.next(); // skip program name if present
        while let Some(raw_flag) = iter.next() {
            let flag = raw_flag.as_ref();
            if !flag.starts_with("--") {
                bail!("Unexpected argument '{flag}'. Flags take the form --name <value>.");
            }
            let key = &flag[2..];
            let value =
                iter.next().ok_or_else(|| anyhow!("Expected a value after '{flag}'"))?.as_ref().to_string();
            match key {
                "config" => overrides.config = Some(PathBuf::from(value)),
                "bundle-list" => overrides.bundle_list = Some(PathBuf::from(value)),
                "bundle" => overrides.bundle = Some(value),
                "mode" => overrides.mode = Some(parse_mode(&value)?),
                "open" => {
                    overrides.open = value
                        .split(',')
                        .map(str::trim)
                        .filter(|name| !name.is_empty())
                        .map(SceneId::from)
                        .collect();
                }
                "log" => overrides.log = Some(value),
                _ => bail!(
                    "Unknown flag '{flag}'. Supported flags: --config, --bundle-list, --bundle, --mode, --open, --log."
                ),
            }
        }
        Ok(overrides)
    }

    pub fn config_path(&self) -> Option<&PathBuf> {
        self.config.as_ref()
    }

    /// Scenes the simulated host starts with.
    pub fn open_scenes(&self) -> &[SceneId] {
        &self.open
    }

    pub fn into_config_overrides(self) -> LoaderConfigOverrides {
        LoaderConfigOverrides {
            bundle_list: self.bundle_list,
            startup_bundle: self.bundle,
            load_mode: self.mode,
            log_filter: self.log,
        }
    }
}

fn parse_mode(value: &str) -> Result<LoadMode> {
    match value.to_ascii_lowercase().as_str() {
        "blocking" | "sync" => Ok(LoadMode::Blocking),
        "async" => Ok(LoadMode::Async),
        other => bail!("Invalid mode '{other}'. Use blocking or async."),
    }
}
