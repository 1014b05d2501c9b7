use crate::bundle::{SceneBundle, SceneId};
use crate::host::LoadSceneMode;
use serde::Serialize;

/// Outcome of diffing the open scenes against a target bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationPlan {
    scenes_to_unload: Vec<SceneId>,
    scenes_to_load: Vec<SceneId>,
    full_reload: bool,
    /// Persistent scenes found open. `None` when no persistent bundle is configured.
    present_persistent: Option<usize>,
    persistent_total: Option<usize>,
}

/// Computes which open scenes have to go before `target` can be loaded.
///
/// Scenes listed in `persistent` are never scheduled for unload; they are
/// counted instead so the sequencer can tell whether some went missing.
pub fn plan(current: &[SceneId], persistent: Option<&[SceneId]>, target: &SceneBundle) -> ReconciliationPlan {
    let mut scenes_to_unload = Vec::with_capacity(current.len());
    let present_persistent = match persistent {
        None => {
            scenes_to_unload.extend(current.iter().cloned());
            None
        }
        Some(persistent) => {
            let mut present = 0;
            for scene in current {
                if persistent.contains(scene) {
                    present += 1;
                } else {
                    scenes_to_unload.push(scene.clone());
                }
            }
            Some(present)
        }
    };
    let full_reload = current.len() <= scenes_to_unload.len();
    ReconciliationPlan {
        scenes_to_unload,
        scenes_to_load: target.scenes().to_vec(),
        full_reload,
        present_persistent,
        persistent_total: persistent.map(<[SceneId]>::len),
    }
}

impl ReconciliationPlan {
    pub fn scenes_to_unload(&self) -> &[SceneId] {
        &self.scenes_to_unload
    }

    pub fn scenes_to_load(&self) -> &[SceneId] {
        &self.scenes_to_load
    }

    pub fn full_reload(&self) -> bool {
        self.full_reload
    }

    pub fn present_persistent(&self) -> Option<usize> {
        self.present_persistent
    }

    /// Persistent count with `-1` standing for "no persistent bundle".
    pub fn missing_persistent_count(&self) -> i64 {
        self.present_persistent.map_or(-1, |count| count as i64)
    }

    pub fn needs_persistent_repair(&self) -> bool {
        match (self.present_persistent, self.persistent_total) {
            (Some(present), Some(total)) => present != total,
            _ => false,
        }
    }

    /// Scenes actually unloaded. On a full reload the first entry stays open
    /// until the first target scene replaces it.
    pub fn unload_queue(&self) -> &[SceneId] {
        if self.full_reload && !self.scenes_to_unload.is_empty() {
            &self.scenes_to_unload[1..]
        } else {
            &self.scenes_to_unload
        }
    }

    pub fn first_load_mode(&self) -> LoadSceneMode {
        if self.full_reload {
            LoadSceneMode::Single
        } else {
            LoadSceneMode::Additive
        }
    }
}
