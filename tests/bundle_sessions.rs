use anyhow::Result;
use bevy_ecs::world::World;
use scene_bundles::bundle::{BundleList, SceneBundle, SceneId};
use scene_bundles::events::{BundleEvent, EventBus};
use scene_bundles::host::{HostOp, LoadSceneMode, MemoryHost, SceneHost};
use scene_bundles::loader::{LoadError, LoadMode, SceneBundleLoader, SessionPhase};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Wake, Waker};

fn id(name: &str) -> SceneId {
    SceneId::from(name)
}

fn bundle(name: &str, scenes: &[&str]) -> SceneBundle {
    SceneBundle::new(name, scenes.iter().copied()).expect("bundle")
}

fn list_with_persistent(persistent: &[&str]) -> BundleList {
    BundleList::new(
        vec![bundle("start", &["B", "C"]), bundle("next", &["D", "E"]), bundle("solo", &["D"])],
        Some(bundle("core", persistent)),
    )
    .expect("bundle list")
}

fn named(loader: &SceneBundleLoader, name: &str) -> SceneBundle {
    loader.bundle_list().bundle(name).cloned().expect("bundle in list")
}

#[test]
fn surviving_persistent_scene_keeps_additive_switch() {
    let loader = SceneBundleLoader::new(list_with_persistent(&["A"]));
    let mut host = MemoryHost::with_open_scenes(["A", "B", "C"]);

    let report = loader.load(&mut host, &named(&loader, "next"), LoadMode::Blocking).expect("load next");

    assert!(!report.plan.full_reload());
    assert_eq!(report.unloaded, vec![id("B"), id("C")]);
    assert!(!report.repaired_persistent);
    assert_eq!(report.active, id("D"));
    assert_eq!(
        host.ops(),
        [
            HostOp::SaveModified { scenes: vec![id("B"), id("C")] },
            HostOp::Unload { scene: id("B") },
            HostOp::Unload { scene: id("C") },
            HostOp::Load { scene: id("D"), mode: LoadSceneMode::Additive },
            HostOp::Load { scene: id("E"), mode: LoadSceneMode::Additive },
            HostOp::SetActive { scene: id("D") },
        ]
    );
    assert_eq!(host.open_scene_names(), ["A", "D", "E"]);
    assert_eq!(loader.current_bundle().map(|b| b.name().to_string()).as_deref(), Some("next"));
}

#[test]
fn full_reload_keeps_one_scene_and_repairs_persistent() {
    let loader = SceneBundleLoader::new(list_with_persistent(&["A"]));
    let mut host = MemoryHost::with_open_scenes(["B", "C"]);

    let report = loader.load(&mut host, &named(&loader, "solo"), LoadMode::Blocking).expect("load solo");

    assert!(report.plan.full_reload());
    assert_eq!(report.plan.missing_persistent_count(), 0);
    assert_eq!(report.unloaded, vec![id("C")]);
    assert!(report.repaired_persistent);
    assert_eq!(
        host.ops()[1..],
        [
            HostOp::Unload { scene: id("C") },
            HostOp::Load { scene: id("D"), mode: LoadSceneMode::Single },
            HostOp::Load { scene: id("A"), mode: LoadSceneMode::Additive },
            HostOp::SetActive { scene: id("D") },
        ]
    );
    assert_eq!(host.open_scene_names(), ["D", "A"]);
    assert_eq!(host.active_scene(), Some(id("D")));
}

#[test]
fn partially_missing_persistent_bundle_is_reloaded_whole() {
    let loader = SceneBundleLoader::new(list_with_persistent(&["A", "P"]));
    let mut host = MemoryHost::with_open_scenes(["P", "X"]);

    let report = loader.load(&mut host, &named(&loader, "solo"), LoadMode::Blocking).expect("load solo");

    assert_eq!(report.plan.present_persistent(), Some(1));
    assert!(report.repaired_persistent);
    let repaired: Vec<_> = report.loaded[1..].iter().map(|(scene, _)| scene.as_str()).collect();
    assert_eq!(repaired, ["A", "P"]);
    for scene in ["D", "A", "P"] {
        assert!(host.is_open(scene), "{scene} should be open");
    }
    assert!(!host.is_open("X"));
}

#[test]
fn without_persistent_bundle_everything_is_replaced() {
    let list = BundleList::new(vec![bundle("next", &["D", "E"])], None).unwrap();
    let loader = SceneBundleLoader::new(list);
    let mut host = MemoryHost::with_open_scenes(["B", "C", "F"]);

    let report = loader.load(&mut host, &named(&loader, "next"), LoadMode::Blocking).expect("load next");

    assert_eq!(report.plan.missing_persistent_count(), -1);
    assert_eq!(report.unloaded, vec![id("C"), id("F")]);
    assert_eq!(host.open_scene_names(), ["D", "E"]);
}

#[test]
fn persistent_bundle_cannot_be_loaded_directly() {
    let loader = SceneBundleLoader::new(list_with_persistent(&["A"]));
    let mut host = MemoryHost::with_open_scenes(["B"]);
    let persistent = loader.bundle_list().persistent().cloned().unwrap();

    let err = loader.load(&mut host, &persistent, LoadMode::Blocking).unwrap_err();

    assert!(matches!(err, LoadError::PersistentBundleNotLoadable(_)));
    assert!(err.is_rejection());
    assert!(host.ops().is_empty());
    assert!(loader.drain_events().is_empty());
    assert!(loader.can_load(&persistent).is_err());
}

#[test]
fn foreign_bundle_is_not_in_list() {
    let loader = SceneBundleLoader::new(list_with_persistent(&["A"]));
    let mut host = MemoryHost::with_open_scenes(["B"]);

    let err = loader.load(&mut host, &bundle("next", &["Z"]), LoadMode::Blocking).unwrap_err();

    assert!(matches!(err, LoadError::NotInList(name) if name == "next"));
    assert!(host.ops().is_empty());
}

/// Host that tries to start a second session from inside every scene operation.
struct ReentrantHost {
    inner: MemoryHost,
    loader: Arc<SceneBundleLoader>,
    attempts: Vec<(SessionPhase, bool)>,
}

impl ReentrantHost {
    fn interfere(&mut self) {
        let mut other = MemoryHost::with_open_scenes(["Z"]);
        let bundle = self.loader.bundle_list().bundle("start").cloned().unwrap();
        let phase = self.loader.phase();
        let rejected = matches!(
            self.loader.load(&mut other, &bundle, LoadMode::Blocking),
            Err(LoadError::ConcurrentLoadRejected { .. })
        );
        assert!(other.ops().is_empty());
        self.attempts.push((phase, rejected));
    }
}

impl SceneHost for ReentrantHost {
    fn open_scenes(&self) -> Vec<SceneId> {
        self.inner.open_scenes()
    }

    fn active_scene(&self) -> Option<SceneId> {
        self.inner.active_scene()
    }

    fn load_scene(&mut self, scene: &SceneId, mode: LoadSceneMode) -> Result<SceneId> {
        self.interfere();
        self.inner.load_scene(scene, mode)
    }

    fn unload_scene(&mut self, scene: &SceneId) -> Result<()> {
        self.interfere();
        self.inner.unload_scene(scene)
    }

    fn set_active_scene(&mut self, scene: &SceneId) -> Result<()> {
        self.interfere();
        self.inner.set_active_scene(scene)
    }
}

#[test]
fn second_request_during_session_is_rejected() {
    let loader = Arc::new(SceneBundleLoader::new(list_with_persistent(&["A"])));
    let mut host = ReentrantHost {
        inner: MemoryHost::with_open_scenes(["A", "B", "C"]),
        loader: Arc::clone(&loader),
        attempts: Vec::new(),
    };

    let report = loader.load(&mut host, &named(&loader, "next"), LoadMode::Blocking).expect("outer load");
    assert_eq!(report.active, id("D"));

    let phases: Vec<_> = host.attempts.iter().map(|(phase, _)| *phase).collect();
    assert_eq!(
        phases,
        [
            SessionPhase::Unloading,
            SessionPhase::Unloading,
            SessionPhase::Loading,
            SessionPhase::Loading,
            SessionPhase::Activating,
        ]
    );
    assert!(host.attempts.iter().all(|(_, rejected)| *rejected));
    assert_eq!(loader.phase(), SessionPhase::Idle);
    assert_eq!(loader.current_bundle().unwrap().name(), "next");
}

#[test]
fn bundle_list_is_locked_during_session() {
    let loader = Arc::new(SceneBundleLoader::new(list_with_persistent(&["A"])));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let weak = Arc::downgrade(&loader);
    let record = Arc::clone(&seen);
    loader.observers().subscribe(move |event| {
        if let Some(loader) = weak.upgrade() {
            let swapped = loader.set_bundle_list(list_with_persistent(&["A"])).is_ok();
            record.lock().unwrap().push((event, swapped));
        }
    });

    let mut host = MemoryHost::with_open_scenes(["B"]);
    loader.load(&mut host, &named(&loader, "next"), LoadMode::Blocking).expect("load");

    assert_eq!(
        *seen.lock().unwrap(),
        [
            (BundleEvent::LoadTriggered, false),
            (BundleEvent::AllUnloaded, false),
            (BundleEvent::AllLoaded, true),
        ]
    );
}

#[test]
fn notifications_follow_session_order() {
    let loader = SceneBundleLoader::new(list_with_persistent(&["A"]));
    let mut host = MemoryHost::with_open_scenes(["A", "B"]);
    loader.load(&mut host, &named(&loader, "next"), LoadMode::Blocking).expect("load");

    let events = loader.drain_events();
    assert_eq!(events, [BundleEvent::LoadTriggered, BundleEvent::AllUnloaded, BundleEvent::AllLoaded]);

    let mut world = World::new();
    world.insert_resource(EventBus::default());
    for event in events {
        world.resource_mut::<EventBus>().push(event);
    }
    assert_eq!(world.resource::<EventBus>().len(), 3);
    assert!(loader.drain_events().is_empty());
}

/// Completes every operation on the second poll.
struct YieldOnce<T> {
    value: Option<T>,
    yielded: bool,
}

impl<T: Unpin> Future for YieldOnce<T> {
    type Output = T;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        if !self.yielded {
            self.yielded = true;
            cx.waker().wake_by_ref();
            return Poll::Pending;
        }
        Poll::Ready(self.value.take().expect("polled after completion"))
    }
}

#[derive(Default)]
struct SuspendingHost {
    inner: MemoryHost,
    suspensions: usize,
}

impl SceneHost for SuspendingHost {
    fn open_scenes(&self) -> Vec<SceneId> {
        self.inner.open_scenes()
    }

    fn active_scene(&self) -> Option<SceneId> {
        self.inner.active_scene()
    }

    fn load_scene(&mut self, scene: &SceneId, mode: LoadSceneMode) -> Result<SceneId> {
        self.inner.load_scene(scene, mode)
    }

    fn unload_scene(&mut self, scene: &SceneId) -> Result<()> {
        self.inner.unload_scene(scene)
    }

    fn set_active_scene(&mut self, scene: &SceneId) -> Result<()> {
        self.inner.set_active_scene(scene)
    }

    fn load_scene_async(&mut self, scene: &SceneId, mode: LoadSceneMode) -> impl Future<Output = Result<SceneId>> {
        self.suspensions += 1;
        YieldOnce { value: Some(self.inner.load_scene(scene, mode)), yielded: false }
    }

    fn unload_scene_async(&mut self, scene: &SceneId) -> impl Future<Output = Result<()>> {
        self.suspensions += 1;
        YieldOnce { value: Some(self.inner.unload_scene(scene)), yielded: false }
    }
}

#[test]
fn async_mode_awaits_every_operation() {
    let loader = SceneBundleLoader::new(list_with_persistent(&["A"]));
    let mut host = SuspendingHost { inner: MemoryHost::with_open_scenes(["A", "B", "C"]), suspensions: 0 };

    let report = loader.load(&mut host, &named(&loader, "next"), LoadMode::Async).expect("async load");

    assert_eq!(host.suspensions, 4);
    assert_eq!(report.active, id("D"));
    assert_eq!(host.inner.open_scene_names(), ["A", "D", "E"]);
}

#[test]
fn blocking_mode_skips_async_operations() {
    let loader = SceneBundleLoader::new(list_with_persistent(&["A"]));
    let mut host = SuspendingHost { inner: MemoryHost::with_open_scenes(["B", "C"]), suspensions: 0 };

    loader.load(&mut host, &named(&loader, "solo"), LoadMode::Blocking).expect("blocking load");

    assert_eq!(host.suspensions, 0);
    assert_eq!(host.inner.open_scene_names(), ["D", "A"]);
}

#[test]
fn load_async_runs_on_external_executor() {
    let loader = SceneBundleLoader::new(list_with_persistent(&["A"]));
    let mut host = SuspendingHost { inner: MemoryHost::with_open_scenes(["B", "C"]), suspensions: 0 };
    let solo = named(&loader, "solo");

    let report = pollster::block_on(loader.load_async(&mut host, &solo)).expect("async load");

    assert!(report.repaired_persistent);
    assert_eq!(host.suspensions, 3);
}

struct NoopWake;

impl Wake for NoopWake {
    fn wake(self: Arc<Self>) {}
}

#[test]
fn dropping_a_suspended_session_frees_the_loader() {
    let loader = SceneBundleLoader::new(list_with_persistent(&["A"]));
    let mut host = SuspendingHost { inner: MemoryHost::with_open_scenes(["A", "B", "C"]), suspensions: 0 };
    let next = named(&loader, "next");
    let waker = Waker::from(Arc::new(NoopWake));
    let mut cx = Context::from_waker(&waker);

    {
        let mut session = Box::pin(loader.load_async(&mut host, &next));
        assert!(session.as_mut().poll(&mut cx).is_pending());
        assert_eq!(loader.phase(), SessionPhase::Unloading);
        assert!(loader.can_load(&next).is_err());
    }

    assert_eq!(loader.phase(), SessionPhase::Idle);
    assert!(loader.can_load(&next).is_ok());
    assert!(loader.current_bundle().is_none());
    assert_eq!(host.suspensions, 1);
}

#[test]
fn host_fault_aborts_without_rollback() {
    let loader = SceneBundleLoader::new(list_with_persistent(&["A"]));
    let mut host = MemoryHost::with_open_scenes(["A", "B"]).with_catalog(["D"]);

    let err = loader.load(&mut host, &named(&loader, "next"), LoadMode::Blocking).unwrap_err();

    assert!(matches!(err, LoadError::Host(_)));
    assert!(err.to_string().contains("'E'"));
    assert_eq!(host.open_scene_names(), ["A", "D"]);
    assert_eq!(loader.phase(), SessionPhase::Idle);
    assert_eq!(loader.drain_events(), [BundleEvent::LoadTriggered, BundleEvent::AllUnloaded]);
}
