use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Name of a loadable scene inside the host environment.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SceneId(String);

impl SceneId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SceneId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SceneId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for SceneId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BundleError {
    #[error("scene bundle '{0}' has no scenes")]
    EmptyBundle(String),
    #[error("scene bundle list has no loadable bundles")]
    EmptyList,
    #[error("scene bundle name '{0}' is used more than once")]
    DuplicateBundle(String),
    #[error("persistent bundle '{0}' is also listed as a loadable bundle")]
    PersistentListed(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SceneBundleData {
    name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    description: String,
    #[serde(default)]
    scenes: Vec<SceneId>,
}

/// An authored, ordered group of scenes loaded and unloaded together.
///
/// The first scene becomes the active scene once the bundle is loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SceneBundleData", into = "SceneBundleData")]
pub struct SceneBundle {
    name: String,
    description: String,
    scenes: Vec<SceneId>,
}

impl TryFrom<SceneBundleData> for SceneBundle {
    type Error = BundleError;

    fn try_from(data: SceneBundleData) -> Result<Self, Self::Error> {
        Ok(SceneBundle::new(data.name, data.scenes)?.with_description(data.description))
    }
}

impl From<SceneBundle> for SceneBundleData {
    fn from(bundle: SceneBundle) -> Self {
        Self { name: bundle.name, description: bundle.description, scenes: bundle.scenes }
    }
}

impl SceneBundle {
    pub fn new<I, S>(name: impl Into<String>, scenes: I) -> Result<Self, BundleError>
    where
        I: IntoIterator<Item = S>,
        S: Into<SceneId>,
    {
        let name = name.into();
        let scenes: Vec<SceneId> = scenes.into_iter().map(Into::into).collect();
        if scenes.is_empty() {
            return Err(BundleError::EmptyBundle(name));
        }
        Ok(Self { name, description: String::new(), scenes })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn scenes(&self) -> &[SceneId] {
        &self.scenes
    }

    pub fn scene_count(&self) -> usize {
        self.scenes.len()
    }

    pub fn scene_at(&self, index: usize) -> Option<&SceneId> {
        self.scenes.get(index)
    }

    /// Scene that becomes active after this bundle loads.
    pub fn active_scene(&self) -> &SceneId {
        &self.scenes[0]
    }

    pub fn contains_scene(&self, scene: &str) -> bool {
        self.scenes.iter().any(|s| s.as_str() == scene)
    }

    /// Drops blank entries and repeated scenes, keeping the first occurrence.
    /// Returns how many entries were removed. A bundle holding nothing but
    /// blank entries is left untouched and reported as empty.
    pub fn sanitize(&mut self) -> Result<usize, BundleError> {
        let before = self.scenes.len();
        let mut seen = HashSet::with_capacity(before);
        let kept: Vec<SceneId> =
            self.scenes.iter().filter(|scene| !scene.is_empty() && seen.insert((*scene).clone())).cloned().collect();
        if kept.is_empty() {
            return Err(BundleError::EmptyBundle(self.name.clone()));
        }
        self.scenes = kept;
        Ok(before - self.scenes.len())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BundleListData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    persistent: Option<SceneBundle>,
    #[serde(default)]
    bundles: Vec<SceneBundle>,
}

/// The configured set of loadable bundles plus the optional persistent bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BundleListData", into = "BundleListData")]
pub struct BundleList {
    persistent: Option<SceneBundle>,
    bundles: Vec<SceneBundle>,
}

impl TryFrom<BundleListData> for BundleList {
    type Error = BundleError;

    fn try_from(data: BundleListData) -> Result<Self, Self::Error> {
        BundleList::new(data.bundles, data.persistent)
    }
}

impl From<BundleList> for BundleListData {
    fn from(list: BundleList) -> Self {
        Self { persistent: list.persistent, bundles: list.bundles }
    }
}

impl BundleList {
    pub fn new(bundles: Vec<SceneBundle>, persistent: Option<SceneBundle>) -> Result<Self, BundleError> {
        if bundles.is_empty() {
            return Err(BundleError::EmptyList);
        }
        let mut names = HashSet::with_capacity(bundles.len());
        for bundle in &bundles {
            if bundle.scenes.is_empty() {
                return Err(BundleError::EmptyBundle(bundle.name.clone()));
            }
            if !names.insert(bundle.name.as_str()) {
                return Err(BundleError::DuplicateBundle(bundle.name.clone()));
            }
        }
        if let Some(persistent) = &persistent {
            if persistent.scenes.is_empty() {
                return Err(BundleError::EmptyBundle(persistent.name.clone()));
            }
            if names.contains(persistent.name.as_str()) {
                return Err(BundleError::PersistentListed(persistent.name.clone()));
            }
        }
        Ok(Self { persistent, bundles })
    }

    pub fn bundles(&self) -> &[SceneBundle] {
        &self.bundles
    }

    /// Bundle loaded at startup.
    pub fn default_bundle(&self) -> &SceneBundle {
        &self.bundles[0]
    }

    pub fn persistent(&self) -> Option<&SceneBundle> {
        self.persistent.as_ref()
    }

    pub fn bundle(&self, name: &str) -> Option<&SceneBundle> {
        self.bundles.iter().find(|bundle| bundle.name == name)
    }

    pub fn contains_bundle(&self, bundle: &SceneBundle) -> bool {
        self.bundles.iter().any(|candidate| candidate == bundle)
    }

    pub fn is_persistent(&self, bundle: &SceneBundle) -> bool {
        self.persistent.as_ref().is_some_and(|persistent| persistent == bundle)
    }

    pub fn persistent_scene_ids(&self) -> Option<&[SceneId]> {
        self.persistent.as_ref().map(SceneBundle::scenes)
    }

    /// Scenes of the named bundle, persistent bundle included.
    pub fn resolve(&self, name: &str) -> Option<&[SceneId]> {
        self.bundle(name)
            .or_else(|| self.persistent.as_ref().filter(|persistent| persistent.name == name))
            .map(SceneBundle::scenes)
    }

    /// Sanitizes every bundle, returning the total number of removed entries.
    /// Nothing changes if any bundle would be left without scenes.
    pub fn sanitize(&mut self) -> Result<usize, BundleError> {
        let mut sanitized = self.clone();
        let removed = sanitized
            .persistent
            .iter_mut()
            .chain(sanitized.bundles.iter_mut())
            .map(SceneBundle::sanitize)
            .sum::<Result<usize, BundleError>>()?;
        *self = sanitized;
        Ok(removed)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let list = serde_json::from_str(json).context("Parsing scene bundle list")?;
        Ok(list)
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).with_context(|| format!("Reading bundle list {}", path.display()))?;
        let list = serde_json::from_slice::<BundleList>(&bytes)
            .with_context(|| format!("Parsing bundle list {}", path.display()))?;
        Ok(list)
    }

    pub fn save_to_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Creating bundle list directory {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json.as_bytes()).with_context(|| format!("Writing bundle list {}", path.display()))?;
        Ok(())
    }
}
