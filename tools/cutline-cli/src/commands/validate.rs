//! Validate a stored project.

use cutline_project_model::FsProjectStore;

pub fn run(store: &FsProjectStore, id: &str) -> anyhow::Result<()> {
    println!("Validating project: {id}");

    let project = super::load(store, id)?;
    println!("  Name: {}", project.name);
    println!("  Version: {}", project.version);
    println!("  Sequences: {}", project.sequences.len());
    println!("  Media assets: {}", project.media_assets.len());

    let mut issues = project.validate();
    for asset in project.media_assets.values() {
        if let Some(path) = asset.local_path() {
            if !path.exists() {
                issues.push(format!("asset {} source missing: {}", asset.id, path.display()));
            }
        }
    }
    let unreferenced = project.unreferenced_assets();

    if issues.is_empty() {
        println!("\nProject is valid.");
    } else {
        println!("\nValidation issues:");
        for issue in &issues {
            println!("  - {issue}");
        }
        println!("\n{} issue(s) found. Project may not be fully usable.", issues.len());
    }
    if !unreferenced.is_empty() {
        println!("{} asset(s) not used by any clip.", unreferenced.len());
    }

    Ok(())
}
