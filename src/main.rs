use anyhow::{anyhow, Result};
use scene_bundles::cli::CliOverrides;
use scene_bundles::config::LoaderConfig;
use scene_bundles::{logging, BundleList, MemoryHost, SceneBundleLoader};

const DEFAULT_CONFIG_PATH: &str = "config/scene_bundles.json";

fn main() {
    let cli = match CliOverrides::parse_from_env() {
        Ok(parsed) => parsed,
        Err(err) => {
            eprintln!("[cli] {err}");
            std::process::exit(2);
        }
    };
    if let Err(err) = run(cli) {
        eprintln!("Application error: {err:?}");
        std::process::exit(1);
    }
}

fn run(cli: CliOverrides) -> Result<()> {
    let config_path = cli.config_path().cloned();
    let open = cli.open_scenes().to_vec();
    let overrides = cli.into_config_overrides();

    let (mut config, config_error) = match &config_path {
        Some(path) => (LoaderConfig::load(path)?, None),
        None => LoaderConfig::load_or_fallback(DEFAULT_CONFIG_PATH),
    };
    config.apply_overrides(&overrides);
    logging::init(&config.log_filter);
    if let Some(err) = config_error {
        tracing::warn!(target: "scene_bundles", "Config load error: {err:?}. Falling back to defaults.");
    }
    if !overrides.is_empty() {
        tracing::debug!(target: "scene_bundles", fields = ?overrides.applied_fields(), "cli overrides applied");
    }

    let list = BundleList::load_from_path(&config.bundle_list)?;
    let loader = SceneBundleLoader::new(list);
    loader.observers().subscribe(|event| tracing::info!(target: "scene_bundles", %event, "notification"));
    let mut host = MemoryHost::with_open_scenes(open);

    let report = match &config.startup_bundle {
        Some(name) => loader.load_by_name(&mut host, name, config.load_mode)?,
        None => loader
            .start(&mut host, config.load_mode)?
            .ok_or_else(|| anyhow!("scene bundle loader was already started"))?,
    };

    println!("Bundle:  {}", report.bundle);
    for op in host.ops() {
        println!("  {op}");
    }
    let unloaded: Vec<&str> = report.unloaded.iter().map(|scene| scene.as_str()).collect();
    println!("Unloaded: {}", unloaded.join(", "));
    for (scene, mode) in &report.loaded {
        println!("Loaded:   {scene} ({mode})");
    }
    if report.repaired_persistent {
        println!("Persistent scenes were reloaded");
    }
    println!("Active:  {}", report.active);
    println!("Open:    {}", host.open_scene_names().join(", "));
    Ok(())
}
