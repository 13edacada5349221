//! Create a new Cutline project.

use cutline_project_model::edit::add_track;
use cutline_project_model::{FsProjectStore, Project, ProjectStore, Track, TrackKind};

pub fn run(
    store: &FsProjectStore,
    name: String,
    width: u32,
    height: u32,
    fps: f64,
) -> anyhow::Result<()> {
    if width == 0 || height == 0 || !(fps > 0.0) {
        anyhow::bail!("Invalid sequence format {width}x{height} @ {fps}fps");
    }

    let mut project = Project::new(&name);
    let sequence = &mut project.sequences[0];
    sequence.width = width;
    sequence.height = height;
    sequence.fps = fps;
    let sequence_id = sequence.id.clone();

    let project = add_track(&project, &sequence_id, Track::new(TrackKind::Video).named("V1"), None)?;
    let project = add_track(&project, &sequence_id, Track::new(TrackKind::Audio).named("A1"), None)?;

    let id = store
        .save(None, &project)
        .map_err(|e| anyhow::anyhow!("Failed to create project: {e}"))?;

    println!("Project '{name}' created:");
    println!("  ID: {id}");
    println!("  Directory: {}", store.project_dir(&id).display());
    println!("  Sequence: {width}x{height} @ {fps}fps");
    println!("  Tracks: V1 (video), A1 (audio)");

    Ok(())
}
