//! Show project information.

use cutline_project_model::FsProjectStore;

pub fn run(store: &FsProjectStore, id: &str) -> anyhow::Result<()> {
    let p = super::load(store, id)?;

    println!("Project: {}", p.name);
    println!("  ID: {}", p.id);
    println!("  Created: {}", p.created_at);
    println!("  Modified: {}", p.modified_at);
    println!(
        "  Ripple: {} (multi-track: {})",
        p.settings.ripple_edit, p.settings.multi_track_ripple
    );
    println!();

    for seq in &p.sequences {
        let active = p.settings.active_sequence_id.as_deref() == Some(seq.id.as_str());
        println!(
            "Sequence: {}{}",
            seq.name,
            if active { " (active)" } else { "" }
        );
        println!(
            "  {}x{} @ {}fps, {} Hz, {:.2}s",
            seq.width, seq.height, seq.fps, seq.sample_rate, seq.duration
        );
        for track in &seq.tracks {
            let mut flags = vec![];
            if track.locked {
                flags.push("locked");
            }
            if track.muted {
                flags.push("muted");
            }
            println!(
                "  [{:?}] {} ({} clips){}",
                track.kind,
                track.name,
                track.clips.len(),
                if flags.is_empty() {
                    String::new()
                } else {
                    format!(" [{}]", flags.join(", "))
                }
            );
            for clip in &track.clips {
                let name = p
                    .asset(&clip.media_id)
                    .map_or(clip.media_id.as_str(), |a| a.name.as_str());
                println!(
                    "    {:>8.2}s - {:>8.2}s  {} (effects: {})",
                    clip.start,
                    clip.end(),
                    name,
                    clip.effects.len()
                );
            }
        }
        println!();
    }

    println!("Media assets: {}", p.media_assets.len());
    for asset in p.media_assets.values() {
        let size = match (asset.width, asset.height) {
            (Some(w), Some(h)) => format!(" {w}x{h}"),
            _ => String::new(),
        };
        println!(
            "  {} [{:?}]{} {:.2}s, used by {} clip(s)",
            asset.name,
            asset.kind,
            size,
            asset.duration,
            p.asset_ref_count(&asset.id)
        );
    }

    Ok(())
}
