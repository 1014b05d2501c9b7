use crate::bundle::SceneId;
use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::future::{self, Future};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadSceneMode {
    /// Replace every open scene with the loaded one.
    Single,
    Additive,
}

impl fmt::Display for LoadSceneMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadSceneMode::Single => f.write_str("single"),
            LoadSceneMode::Additive => f.write_str("additive"),
        }
    }
}

/// Scene operations the loader issues against the host environment.
///
/// The host owns the open-scene set and the active scene; the loader only
/// reads snapshots and issues commands. Faults are reported through the
/// returned `Result` and abort the running session without rollback.
pub trait SceneHost {
    /// Open scenes in host enumeration order.
    fn open_scenes(&self) -> Vec<SceneId>;

    fn active_scene(&self) -> Option<SceneId>;

    /// Loads `scene` and returns the scene that was produced.
    fn load_scene(&mut self, scene: &SceneId, mode: LoadSceneMode) -> Result<SceneId>;

    fn unload_scene(&mut self, scene: &SceneId) -> Result<()>;

    fn set_active_scene(&mut self, scene: &SceneId) -> Result<()>;

    /// Called with the unload set before anything is unloaded. Editor hosts
    /// use it to offer saving modified scenes.
    fn save_modified_scenes(&mut self, _scenes: &[SceneId]) -> Result<()> {
        Ok(())
    }

    /// Awaitable load. Dropping the future abandons the operation.
    fn load_scene_async(&mut self, scene: &SceneId, mode: LoadSceneMode) -> impl Future<Output = Result<SceneId>> {
        future::ready(self.load_scene(scene, mode))
    }

    fn unload_scene_async(&mut self, scene: &SceneId) -> impl Future<Output = Result<()>> {
        future::ready(self.unload_scene(scene))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostOp {
    SaveModified { scenes: Vec<SceneId> },
    Unload { scene: SceneId },
    Load { scene: SceneId, mode: LoadSceneMode },
    SetActive { scene: SceneId },
}

impl fmt::Display for HostOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostOp::SaveModified { scenes } => {
                let names: Vec<&str> = scenes.iter().map(SceneId::as_str).collect();
                write!(f, "save-modified [{}]", names.join(", "))
            }
            HostOp::Unload { scene } => write!(f, "unload {scene}"),
            HostOp::Load { scene, mode } => write!(f, "load {scene} ({mode})"),
            HostOp::SetActive { scene } => write!(f, "set-active {scene}"),
        }
    }
}

/// In-process host keeping the open-scene list in memory.
///
/// Refuses to unload the last open scene, mirroring hosts that cannot run
/// with zero scenes.
#[derive(Debug, Clone, Default)]
pub struct MemoryHost {
    open: Vec<SceneId>,
    active: Option<SceneId>,
    catalog: Option<BTreeSet<SceneId>>,
    log: Vec<HostOp>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts with `scenes` open; the first one is active.
    pub fn with_open_scenes<I, S>(scenes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SceneId>,
    {
        let mut open: Vec<SceneId> = Vec::new();
        for scene in scenes.into_iter().map(Into::into) {
            if !open.contains(&scene) {
                open.push(scene);
            }
        }
        let active = open.first().cloned();
        Self { open, active, catalog: None, log: Vec::new() }
    }

    /// Restricts loads to the given scenes; anything else is a host fault.
    pub fn with_catalog<I, S>(mut self, scenes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SceneId>,
    {
        self.catalog = Some(scenes.into_iter().map(Into::into).collect());
        self
    }

    pub fn is_open(&self, scene: &str) -> bool {
        self.open.iter().any(|open| open.as_str() == scene)
    }

    pub fn open_scene_names(&self) -> Vec<&str> {
        self.open.iter().map(SceneId::as_str).collect()
    }

    pub fn ops(&self) -> &[HostOp] {
        &self.log
    }

    pub fn take_ops(&mut self) -> Vec<HostOp> {
        std::mem::take(&mut self.log)
    }
}

impl SceneHost for MemoryHost {
    fn open_scenes(&self) -> Vec<SceneId> {
        self.open.clone()
    }

    fn active_scene(&self) -> Option<SceneId> {
        self.active.clone()
    }

    fn load_scene(&mut self, scene: &SceneId, mode: LoadSceneMode) -> Result<SceneId> {
        if let Some(catalog) = &self.catalog {
            if !catalog.contains(scene) {
                bail!("scene '{scene}' is not part of the host catalog");
            }
        }
        self.log.push(HostOp::Load { scene: scene.clone(), mode });
        match mode {
            LoadSceneMode::Single => {
                self.open.clear();
                self.open.push(scene.clone());
                self.active = Some(scene.clone());
            }
            LoadSceneMode::Additive => {
                if !self.open.contains(scene) {
                    self.open.push(scene.clone());
                }
                if self.active.is_none() {
                    self.active = Some(scene.clone());
                }
            }
        }
        Ok(scene.clone())
    }

    fn unload_scene(&mut self, scene: &SceneId) -> Result<()> {
        let index = self
            .open
            .iter()
            .position(|open| open == scene)
            .ok_or_else(|| anyhow!("scene '{scene}' is not open"))?;
        if self.open.len() == 1 {
            bail!("cannot unload '{scene}': it is the last open scene");
        }
        self.log.push(HostOp::Unload { scene: scene.clone() });
        self.open.remove(index);
        if self.active.as_ref() == Some(scene) {
            self.active = self.open.first().cloned();
        }
        Ok(())
    }

    fn set_active_scene(&mut self, scene: &SceneId) -> Result<()> {
        if !self.open.contains(scene) {
            bail!("cannot activate '{scene}': it is not open");
        }
        self.log.push(HostOp::SetActive { scene: scene.clone() });
        self.active = Some(scene.clone());
        Ok(())
    }

    fn save_modified_scenes(&mut self, scenes: &[SceneId]) -> Result<()> {
        if !scenes.is_empty() {
            self.log.push(HostOp::SaveModified { scenes: scenes.to_vec() });
        }
        Ok(())
    }
}
