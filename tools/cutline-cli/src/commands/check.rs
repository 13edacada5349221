//! Check system capabilities.

use cutline_common::config_file_path;
use cutline_media_cache::command_exists;
use cutline_project_model::FsProjectStore;

pub fn run(store: &FsProjectStore) -> anyhow::Result<()> {
    println!("Cutline System Check");
    println!("{}", "=".repeat(50));

    let tools = [
        ("ffmpeg", "decoding and export"),
        ("ffprobe", "media probing"),
    ];
    let mut all_ok = true;
    for (tool, purpose) in tools {
        if command_exists(tool) {
            println!("[OK] {tool} found ({purpose})");
        } else {
            all_ok = false;
            println!("[MISSING] {tool} not on PATH ({purpose})");
        }
    }

    println!();
    let config_path = config_file_path();
    println!(
        "Config: {}{}",
        config_path.display(),
        if config_path.exists() { "" } else { " (defaults)" }
    );
    println!("Project store: {}", store.root().display());
    match store.list_projects() {
        Ok(ids) => println!("  Projects: {}", ids.len()),
        Err(e) => println!("  [WARN] Cannot list projects: {e}"),
    }

    println!();
    if all_ok {
        println!("All required tools are available. Cutline is ready.");
    } else {
        println!("Some required tools are missing. Install ffmpeg to import and export.");
    }

    Ok(())
}
