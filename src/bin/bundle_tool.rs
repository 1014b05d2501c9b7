use anyhow::{anyhow, Context, Result};
use scene_bundles::bundle::{BundleList, SceneId};
use scene_bundles::plan::plan;
use std::env;
use std::path::Path;
use std::process;

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:?}");
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let mut args = env::args().skip(1);
    let Some(command) = args.next() else {
        print_usage();
        return Ok(());
    };
    match command.as_str() {
        "validate" => {
            let list_path = args
                .next()
                .ok_or_else(|| anyhow!("validate requires a path: bundle_tool validate <list>"))?;
            cmd_validate(&list_path)
        }
        "list" => {
            let list_path =
                args.next().ok_or_else(|| anyhow!("list requires a path: bundle_tool list <list>"))?;
            cmd_list(&list_path)
        }
        "plan" => {
            let list_path = args.next().ok_or_else(|| {
                anyhow!("plan requires arguments: bundle_tool plan <list> <bundle> [open scenes...]")
            })?;
            let bundle = args.next().ok_or_else(|| anyhow!("plan missing bundle name argument"))?;
            let open: Vec<SceneId> = args.map(SceneId::from).collect();
            cmd_plan(&list_path, &bundle, &open)
        }
        "sanitize" => {
            let input = args
                .next()
                .ok_or_else(|| anyhow!("sanitize requires input path: bundle_tool sanitize <in> <out>"))?;
            let output = args
                .next()
                .ok_or_else(|| anyhow!("sanitize requires output path: bundle_tool sanitize <in> <out>"))?;
            cmd_sanitize(&input, &output)
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => Err(anyhow!("unknown command '{other}'")),
    }
}

fn print_usage() {
    eprintln!(
        "Bundle Tool

Usage:
  bundle_tool validate <list>                 Check bundles for blank, repeated, or persistent scenes
  bundle_tool list <list>                     List bundles and their scenes
  bundle_tool plan <list> <bundle> [open...]  Show the unload/load plan for switching to <bundle>
  bundle_tool sanitize <in> <out>             Drop blank and repeated scene entries
  bundle_tool help                            Show this message
"
    );
}

fn cmd_validate(list_path: &str) -> Result<()> {
    let list = load_list(list_path)?;
    let mut issues = Vec::new();

    let mut sanitized = list.clone();
    match sanitized.sanitize() {
        Ok(0) => {}
        Ok(removed) => {
            issues.push(format!("{removed} blank or repeated scene entries (run `bundle_tool sanitize`)"))
        }
        Err(err) => issues.push(format!("{err}; only blank entries remain after sanitizing")),
    }
    if let Some(persistent) = list.persistent() {
        for bundle in list.bundles() {
            for scene in bundle.scenes() {
                if persistent.contains_scene(scene.as_str()) {
                    issues.push(format!(
                        "bundle '{}' lists persistent scene '{}'; it would never be unloaded",
                        bundle.name(),
                        scene
                    ));
                }
            }
        }
    }

    if issues.is_empty() {
        println!(
            "Bundle list '{}' is valid. Bundles: {}. Persistent: {}",
            list_path,
            list.bundles().len(),
            list.persistent().map(|bundle| bundle.name()).unwrap_or("-"),
        );
        Ok(())
    } else {
        Err(anyhow!(format!("bundle list '{}' has issues:\n  - {}", list_path, issues.join("\n  - "))))
    }
}

fn cmd_list(list_path: &str) -> Result<()> {
    let list = load_list(list_path)?;
    println!("{:<5} {:<24} {}", "Idx", "Bundle", "Scenes");
    println!("{}", "-".repeat(80));
    if let Some(persistent) = list.persistent() {
        println!("{:<5} {:<24} {}", "P", persistent.name(), join(persistent.scenes()));
    }
    for (index, bundle) in list.bundles().iter().enumerate() {
        let marker = if index == 0 { format!("{index}*") } else { index.to_string() };
        println!("{:<5} {:<24} {}", marker, bundle.name(), join(bundle.scenes()));
        if !bundle.description().is_empty() {
            println!("{:<5} {:<24} {}", "", "", bundle.description());
        }
    }
    Ok(())
}

fn cmd_plan(list_path: &str, bundle_name: &str, open: &[SceneId]) -> Result<()> {
    let list = load_list(list_path)?;
    let bundle = list
        .bundle(bundle_name)
        .ok_or_else(|| anyhow!("bundle '{bundle_name}' is not a loadable bundle of '{list_path}'"))?;
    let plan = plan(open, list.persistent_scene_ids(), bundle);
    println!("Open:             {}", join(open));
    println!("Unload set:       {}", join(plan.scenes_to_unload()));
    println!("Unload order:     {}", join(plan.unload_queue()));
    println!("Full reload:      {}", plan.full_reload());
    println!("First load mode:  {}", plan.first_load_mode());
    println!("Load order:       {}", join(plan.scenes_to_load()));
    println!("Persistent found: {}", plan.missing_persistent_count());
    println!("Repair persistent:{}", if plan.needs_persistent_repair() { " yes" } else { " no" });
    println!("Active:           {}", bundle.active_scene());
    Ok(())
}

fn cmd_sanitize(input_path: &str, output_path: &str) -> Result<()> {
    let mut list = load_list(input_path)?;
    let removed = list.sanitize().with_context(|| format!("Sanitizing bundle list {input_path}"))?;
    list.save_to_path(output_path)?;
    println!("Removed {removed} entries: '{}' -> '{}'", input_path, output_path);
    Ok(())
}

fn join(scenes: &[SceneId]) -> String {
    if scenes.is_empty() {
        return "-".to_string();
    }
    scenes.iter().map(SceneId::as_str).collect::<Vec<_>>().join(", ")
}

fn load_list(path: &str) -> Result<BundleList> {
    let normalized = Path::new(path).canonicalize().unwrap_or_else(|_| Path::new(path).to_path_buf());
    BundleList::load_from_path(&normalized)
        .with_context(|| format!("loading bundle list '{}'", normalized.display()))
}
