use crate::mods::{ExtractProgress, Mod};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

const FALLBACK_MOD_DIR: &str = "Unnamed Mod";

/// What to do when a mod's library directory is already present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExistingDestination {
    /// Delete the old directory before extracting.
    #[default]
    Replace,
    /// Extract over the old directory, keeping files the archive does not ship.
    Merge,
    /// Leave the old directory alone and do not extract the mod.
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractOptions {
    pub library_dir: PathBuf,
    pub compress_packages: bool,
    pub existing: ExistingDestination,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractEvent {
    Status(String),
    /// Whole percent for the mod currently being extracted.
    Progress(u8),
    Finished { name: String, destination: PathBuf },
}

/// `library_dir/<GAME>/<sanitized mod name>`
pub fn mod_destination(library_dir: &Path, target: &Mod) -> PathBuf {
    library_dir
        .join(target.game.library_dir_name())
        .join(sanitize_mod_name(&target.name))
}

pub fn sanitize_mod_name(name: &str) -> String {
    let cleaned = sanitize_filename::sanitize(name.trim());
    let cleaned = cleaned.trim().trim_end_matches('.').trim();
    if cleaned.is_empty() {
        FALLBACK_MOD_DIR.to_string()
    } else {
        cleaned.to_string()
    }
}

/// Extracts every selected mod of `mods` from `archive_path` into the library.
///
/// Returns the mods that were extracted, in order. Unselected and invalid mods
/// are never touched.
pub fn extract_selected(
    archive_path: &Path,
    mods: &[Mod],
    options: &ExtractOptions,
    on_event: &mut dyn FnMut(ExtractEvent),
) -> Result<Vec<Mod>> {
    let mut extracted = Vec::new();

    for target in mods.iter().filter(|m| m.selected_for_import && m.valid) {
        let destination = mod_destination(&options.library_dir, target);
        if destination.exists() {
            match options.existing {
                ExistingDestination::Replace => {
                    log::info!("Replacing existing {}", destination.display());
                    fs::remove_dir_all(&destination).with_context(|| {
                        format!("remove existing mod dir {}", destination.display())
                    })?;
                }
                ExistingDestination::Merge => {
                    log::info!("Merging into existing {}", destination.display());
                }
                ExistingDestination::Skip => {
                    log::info!(
                        "Skipping {}: {} already exists",
                        target.name,
                        destination.display()
                    );
                    on_event(ExtractEvent::Status(format!(
                        "Skipped {}, already in the library",
                        target.name
                    )));
                    continue;
                }
            }
        }
        fs::create_dir_all(&destination)
            .with_context(|| format!("create mod dir {}", destination.display()))?;

        log::info!("Extracting mod: {}", target.name);
        target.extract_from_archive(
            archive_path,
            &destination,
            options.compress_packages,
            &mut |progress| match progress {
                ExtractProgress::Status(text) => on_event(ExtractEvent::Status(text)),
                ExtractProgress::Percent(percent) => on_event(ExtractEvent::Progress(percent)),
            },
        )?;

        on_event(ExtractEvent::Finished {
            name: target.name.clone(),
            destination,
        });
        extracted.push(target.clone());
    }

    Ok(extracted)
}
