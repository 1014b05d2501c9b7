use crate::bundle::{BundleList, SceneBundle, SceneId};
use crate::events::{BundleEvent, BundleObservers, EventBus};
use crate::host::{LoadSceneMode, SceneHost};
use crate::plan::{plan, ReconciliationPlan};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, error, info, warn};

const LOG_TARGET: &str = "scene_bundles";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Idle,
    Unloading,
    Loading,
    RepairingPersistent,
    Activating,
    Done,
}

impl SessionPhase {
    /// True while a session owns the host, `Done` included; new requests are
    /// rejected until the session guard returns the loader to `Idle`.
    pub fn is_busy(self) -> bool {
        self != SessionPhase::Idle
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Unloading => "unloading",
            SessionPhase::Loading => "loading",
            SessionPhase::RepairingPersistent => "repairing persistent scenes",
            SessionPhase::Activating => "activating",
            SessionPhase::Done => "done",
        };
        f.write_str(label)
    }
}

/// How each scene operation of a session is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadMode {
    /// Every load/unload is assumed complete when the host call returns.
    #[default]
    Blocking,
    /// Every load/unload is awaited before the next one starts.
    Async,
}

impl fmt::Display for LoadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadMode::Blocking => f.write_str("blocking"),
            LoadMode::Async => f.write_str("async"),
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("scene bundle '{0}' doesn't belong to the current bundle list")]
    NotInList(String),
    #[error("no loadable scene bundle named '{0}' in the current bundle list")]
    UnknownBundle(String),
    #[error("persistent bundle '{0}' is loaded automatically and cannot be loaded manually")]
    PersistentBundleNotLoadable(String),
    #[error("cannot load bundle '{requested}' while the loader is {phase}")]
    ConcurrentLoadRejected { requested: String, phase: SessionPhase },
    #[error("cannot replace the bundle list while the loader is {0}")]
    ListLocked(SessionPhase),
    #[error(transparent)]
    Host(#[from] anyhow::Error),
}

impl LoadError {
    /// Rejections happen before any scene operation is issued.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, LoadError::Host(_))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub bundle: String,
    pub plan: ReconciliationPlan,
    pub unloaded: Vec<SceneId>,
    pub loaded: Vec<(SceneId, LoadSceneMode)>,
    pub repaired_persistent: bool,
    pub active: SceneId,
}

#[derive(Debug, Default)]
struct SessionState {
    phase: SessionPhase,
    current_bundle: Option<SceneBundle>,
}

/// Switches the host between scene bundles, one session at a time.
///
/// A session unloads every open scene outside the persistent bundle, loads
/// the target bundle in order, reloads the persistent bundle if any of it
/// went missing, and finally activates the first scene of the target.
#[derive(Debug)]
pub struct SceneBundleLoader {
    session: Mutex<SessionState>,
    list: Mutex<Arc<BundleList>>,
    observers: BundleObservers,
    bus: Mutex<EventBus>,
    started: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Returns the loader to `Idle` when the session ends, however it ends.
struct SessionGuard<'a> {
    loader: &'a SceneBundleLoader,
}

impl SessionGuard<'_> {
    fn advance(&self, phase: SessionPhase) {
        debug!(target: LOG_TARGET, %phase, "session phase");
        lock(&self.loader.session).phase = phase;
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        lock(&self.loader.session).phase = SessionPhase::Idle;
    }
}

impl SceneBundleLoader {
    pub fn new(list: BundleList) -> Self {
        Self {
            session: Mutex::new(SessionState::default()),
            list: Mutex::new(Arc::new(list)),
            observers: BundleObservers::default(),
            bus: Mutex::new(EventBus::default()),
            started: AtomicBool::new(false),
        }
    }

    pub fn bundle_list(&self) -> Arc<BundleList> {
        Arc::clone(&lock(&self.list))
    }

    /// Swaps the bundle list. Refused while a session is running.
    pub fn set_bundle_list(&self, list: BundleList) -> Result<(), LoadError> {
        let session = lock(&self.session);
        if session.phase.is_busy() {
            return Err(self.reject(LoadError::ListLocked(session.phase)));
        }
        *lock(&self.list) = Arc::new(list);
        info!(target: LOG_TARGET, "bundle list replaced");
        Ok(())
    }

    /// Bundle loaded by the last completed session.
    pub fn current_bundle(&self) -> Option<SceneBundle> {
        lock(&self.session).current_bundle.clone()
    }

    pub fn phase(&self) -> SessionPhase {
        lock(&self.session).phase
    }

    pub fn is_loading(&self) -> bool {
        self.phase().is_busy()
    }

    pub fn observers(&self) -> &BundleObservers {
        &self.observers
    }

    pub fn drain_events(&self) -> Vec<BundleEvent> {
        lock(&self.bus).drain()
    }

    /// Checks whether `bundle` would be accepted right now, without side effects.
    pub fn can_load(&self, bundle: &SceneBundle) -> Result<(), LoadError> {
        let session = lock(&self.session);
        let list = self.bundle_list();
        Self::check(&session, &list, bundle)
    }

    /// Runs a full session and returns once the target bundle is active.
    /// `LoadMode::Async` awaits each host operation on the calling thread.
    pub fn load<H: SceneHost>(
        &self,
        host: &mut H,
        bundle: &SceneBundle,
        mode: LoadMode,
    ) -> Result<LoadReport, LoadError> {
        pollster::block_on(self.run(host, bundle, mode))
    }

    /// Session future for callers that drive their own executor. Dropping it
    /// abandons the session and frees the loader.
    pub async fn load_async<H: SceneHost>(
        &self,
        host: &mut H,
        bundle: &SceneBundle,
    ) -> Result<LoadReport, LoadError> {
        self.run(host, bundle, LoadMode::Async).await
    }

    pub fn load_by_name<H: SceneHost>(
        &self,
        host: &mut H,
        name: &str,
        mode: LoadMode,
    ) -> Result<LoadReport, LoadError> {
        let list = self.bundle_list();
        if list.persistent().is_some_and(|persistent| persistent.name() == name) {
            return Err(self.reject(LoadError::PersistentBundleNotLoadable(name.to_string())));
        }
        let Some(bundle) = list.bundle(name).cloned() else {
            return Err(self.reject(LoadError::UnknownBundle(name.to_string())));
        };
        self.load(host, &bundle, mode)
    }

    /// Loads the default bundle. Once a start succeeds, later calls do nothing;
    /// a failed start may be retried.
    pub fn start<H: SceneHost>(&self, host: &mut H, mode: LoadMode) -> Result<Option<LoadReport>, LoadError> {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!(target: LOG_TARGET, "scene bundle loader already started");
            return Ok(None);
        }
        let bundle = self.bundle_list().default_bundle().clone();
        match self.load(host, &bundle, mode) {
            Ok(report) => Ok(Some(report)),
            Err(err) => {
                self.started.store(false, Ordering::SeqCst);
                Err(err)
            }
        }
    }

    fn check(session: &SessionState, list: &BundleList, bundle: &SceneBundle) -> Result<(), LoadError> {
        if list.is_persistent(bundle) {
            return Err(LoadError::PersistentBundleNotLoadable(bundle.name().to_string()));
        }
        if !list.contains_bundle(bundle) {
            return Err(LoadError::NotInList(bundle.name().to_string()));
        }
        if session.phase.is_busy() {
            return Err(LoadError::ConcurrentLoadRejected {
                requested: bundle.name().to_string(),
                phase: session.phase,
            });
        }
        Ok(())
    }

    fn reject(&self, err: LoadError) -> LoadError {
        error!(target: LOG_TARGET, "{err}");
        err
    }

    fn begin_session(&self, bundle: &SceneBundle) -> Result<(SessionGuard<'_>, Arc<BundleList>), LoadError> {
        let mut session = lock(&self.session);
        let list = self.bundle_list();
        if let Err(err) = Self::check(&session, &list, bundle) {
            drop(session);
            return Err(self.reject(err));
        }
        session.phase = SessionPhase::Unloading;
        Ok((SessionGuard { loader: self }, list))
    }

    fn emit(&self, event: BundleEvent) {
        lock(&self.bus).push(event);
        self.observers.notify(event);
    }

    async fn run<H: SceneHost>(
        &self,
        host: &mut H,
        bundle: &SceneBundle,
        mode: LoadMode,
    ) -> Result<LoadReport, LoadError> {
        let (guard, list) = self.begin_session(bundle)?;
        info!(target: LOG_TARGET, bundle = bundle.name(), %mode, "loading scene bundle");
        let result = self.sequence(&guard, &list, host, bundle, mode).await;
        drop(guard);
        match &result {
            Ok(report) => {
                info!(target: LOG_TARGET, bundle = bundle.name(), active = %report.active, "scene bundle loaded");
                self.emit(BundleEvent::AllLoaded);
            }
            Err(err) => {
                error!(target: LOG_TARGET, bundle = bundle.name(), "scene bundle session aborted: {err:#}");
            }
        }
        result
    }

    async fn sequence<H: SceneHost>(
        &self,
        guard: &SessionGuard<'_>,
        list: &BundleList,
        host: &mut H,
        bundle: &SceneBundle,
        mode: LoadMode,
    ) -> Result<LoadReport, LoadError> {
        self.emit(BundleEvent::LoadTriggered);

        let plan = plan(&host.open_scenes(), list.persistent_scene_ids(), bundle);
        debug!(
            target: LOG_TARGET,
            unload = plan.scenes_to_unload().len(),
            full_reload = plan.full_reload(),
            present_persistent = plan.missing_persistent_count(),
            "reconciliation plan"
        );

        host.save_modified_scenes(plan.scenes_to_unload())?;
        let mut unloaded = Vec::with_capacity(plan.unload_queue().len());
        for scene in plan.unload_queue() {
            unload_scene(host, scene, mode).await?;
            unloaded.push(scene.clone());
        }
        self.emit(BundleEvent::AllUnloaded);

        guard.advance(SessionPhase::Loading);
        let scenes = plan.scenes_to_load();
        let mut loaded = Vec::with_capacity(scenes.len());
        let first_mode = plan.first_load_mode();
        let active = load_scene(host, &scenes[0], first_mode, mode).await?;
        loaded.push((scenes[0].clone(), first_mode));
        for scene in &scenes[1..] {
            load_scene(host, scene, LoadSceneMode::Additive, mode).await?;
            loaded.push((scene.clone(), LoadSceneMode::Additive));
        }

        guard.advance(SessionPhase::RepairingPersistent);
        let repaired_persistent = match list.persistent() {
            Some(persistent) if plan.needs_persistent_repair() => {
                for scene in persistent.scenes() {
                    load_scene(host, scene, LoadSceneMode::Additive, mode).await?;
                    loaded.push((scene.clone(), LoadSceneMode::Additive));
                }
                true
            }
            _ => false,
        };

        guard.advance(SessionPhase::Activating);
        host.set_active_scene(&active)?;
        lock(&self.session).current_bundle = Some(bundle.clone());

        guard.advance(SessionPhase::Done);
        Ok(LoadReport {
            bundle: bundle.name().to_string(),
            plan,
            unloaded,
            loaded,
            repaired_persistent,
            active,
        })
    }
}

async fn load_scene<H: SceneHost>(
    host: &mut H,
    scene: &SceneId,
    scene_mode: LoadSceneMode,
    mode: LoadMode,
) -> anyhow::Result<SceneId> {
    match mode {
        LoadMode::Blocking => host.load_scene(scene, scene_mode),
        LoadMode::Async => host.load_scene_async(scene, scene_mode).await,
    }
}

async fn unload_scene<H: SceneHost>(host: &mut H, scene: &SceneId, mode: LoadMode) -> anyhow::Result<()> {
    match mode {
        LoadMode::Blocking => host.unload_scene(scene),
        LoadMode::Async => host.unload_scene_async(scene).await,
    }
}
