pub mod bundle;
pub mod cli;
pub mod config;
pub mod events;
pub mod host;
pub mod loader;
pub mod logging;
pub mod plan;

pub use bundle::{BundleList, SceneBundle, SceneId};
pub use host::{LoadSceneMode, MemoryHost, SceneHost};
pub use loader::{LoadError, LoadMode, LoadReport, SceneBundleLoader, SessionPhase};
