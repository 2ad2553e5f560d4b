use crate::archive::{open_archive, strip_entry_dir, ArchiveReader, VisitedFile};
use crate::classify::DESCRIPTOR_FILENAME;
use crate::error::ArchiveError;
use crate::game::GameId;
use anyhow::{Context, Result};
use filetime::{set_file_mtime, FileTime};
use serde::Serialize;
use std::{
    fs,
    io::{self, Read},
    path::{Component, Path, PathBuf},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobHeader {
    Basegame,
    BalanceChanges,
    Me1Config,
    CustomDlc,
}

impl JobHeader {
    pub fn section_name(self) -> &'static str {
        match self {
            JobHeader::Basegame => "BASEGAME",
            JobHeader::BalanceChanges => "BALANCE_CHANGES",
            JobHeader::Me1Config => "ME1_CONFIG",
            JobHeader::CustomDlc => "CUSTOMDLC",
        }
    }

    /// Headers whose payload is a single `moddir` directory.
    pub fn moddir_headers() -> [JobHeader; 3] {
        [
            JobHeader::Basegame,
            JobHeader::BalanceChanges,
            JobHeader::Me1Config,
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModJob {
    pub header: JobHeader,
    /// Directories relative to the mod's anchor directory.
    pub source_dirs: Vec<String>,
    pub dest_dirs: Vec<String>,
}

/// A mod discovered inside an archive, described by a real or synthesized descriptor.
#[derive(Debug, Clone, Serialize)]
pub struct Mod {
    pub name: String,
    pub game: GameId,
    pub version_string: String,
    pub parsed_version: f64,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_failure: Option<String>,
    pub selected_for_import: bool,
    pub archive_path: PathBuf,
    /// In-archive descriptor path; `None` for virtual mods.
    pub descriptor_entry: Option<String>,
    /// Archive directory the mod's paths are relative to; empty at the root.
    pub anchor_dir: String,
    pub is_virtual: bool,
    pub unofficial: bool,
    pub developer: Option<String>,
    pub site: Option<String>,
    pub description: Option<String>,
    pub update_code: Option<u32>,
    pub archive_hash: Option<String>,
    pub descriptor_version: f64,
    pub jobs: Vec<ModJob>,
    #[serde(skip)]
    pub descriptor_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractProgress {
    Status(String),
    /// Whole percent, 0-100. 100 is only sent once extraction is complete.
    Percent(u8),
}

impl Mod {
    pub fn new(archive_path: &Path, anchor_dir: &str, descriptor_text: &str) -> Self {
        Self {
            name: String::new(),
            game: GameId::default(),
            version_string: String::new(),
            parsed_version: 0.0,
            valid: false,
            load_failure: None,
            selected_for_import: true,
            archive_path: archive_path.to_path_buf(),
            descriptor_entry: None,
            anchor_dir: anchor_dir.to_string(),
            is_virtual: false,
            unofficial: false,
            developer: None,
            site: None,
            description: None,
            update_code: None,
            archive_hash: None,
            descriptor_version: 0.0,
            jobs: Vec::new(),
            descriptor_text: descriptor_text.to_string(),
        }
    }

    pub fn apply_version(&mut self, version: &str) {
        self.version_string = version.trim().to_string();
        self.parsed_version = parse_version_number(version);
    }

    pub fn display_version(&self) -> &str {
        if self.version_string.is_empty() {
            "0"
        } else {
            &self.version_string
        }
    }

    /// True if `entry_path` lies under one of this mod's job source directories.
    pub fn owns_entry(&self, entry_path: &str) -> bool {
        self.relative_path(entry_path).is_some()
    }

    fn relative_path<'a>(&self, entry_path: &'a str) -> Option<&'a str> {
        let relative = strip_entry_dir(entry_path, &self.anchor_dir)?;
        let owned = self.jobs.iter().any(|job| {
            job.source_dirs
                .iter()
                .any(|dir| strip_entry_dir(relative, dir).is_some())
        });
        owned.then_some(relative)
    }

    pub fn extract_from_archive(
        &self,
        archive_path: &Path,
        dest: &Path,
        compress_packages: bool,
        on_progress: &mut dyn FnMut(ExtractProgress),
    ) -> Result<usize> {
        let mut archive = open_archive(archive_path)
            .with_context(|| format!("open archive {}", archive_path.display()))?;
        self.extract_from_reader(archive.as_mut(), dest, compress_packages, on_progress)
    }

    pub fn extract_from_reader(
        &self,
        archive: &mut dyn ArchiveReader,
        dest: &Path,
        compress_packages: bool,
        on_progress: &mut dyn FnMut(ExtractProgress),
    ) -> Result<usize> {
        if compress_packages {
            log::debug!(
                "Package compression requested for {}; packages are stored as shipped",
                self.name
            );
        }
        let total = archive
            .entries()
            .iter()
            .filter(|entry| !entry.is_dir && self.owns_entry(&entry.path))
            .count();
        on_progress(ExtractProgress::Status(format!("Extracting {}", self.name)));
        on_progress(ExtractProgress::Percent(0));

        let mut written = 0usize;
        let mut last_percent = 0u8;
        archive
            .visit_files(
                &mut |path| self.owns_entry(path),
                &mut |file: VisitedFile<'_>, data: &mut dyn Read| {
                    let Some(relative) = self.relative_path(file.path) else {
                        return Ok(());
                    };
                    let Some(target) = enclosed_target(dest, relative) else {
                        log::warn!("Skipping unsafe archive path {}", file.path);
                        return Ok(());
                    };
                    write_entry(&target, data, file.modified_at)?;
                    written += 1;
                    let percent = ((written * 100) / total.max(1)).min(99) as u8;
                    if percent != last_percent {
                        last_percent = percent;
                        on_progress(ExtractProgress::Percent(percent));
                    }
                    Ok(())
                },
            )
            .with_context(|| format!("extract {}", self.name))?;

        fs::write(dest.join(DESCRIPTOR_FILENAME), &self.descriptor_text)
            .context("write moddesc.ini")?;
        on_progress(ExtractProgress::Percent(100));
        log::info!("Extracted {written} file(s) for {}", self.name);
        Ok(written)
    }
}

/// Best-effort numeric version; anything unparsable reads as 0.
pub fn parse_version_number(version: &str) -> f64 {
    version
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .unwrap_or(0.0)
}

fn enclosed_target(dest: &Path, relative: &str) -> Option<PathBuf> {
    let relative = Path::new(relative);
    let safe = relative
        .components()
        .all(|component| matches!(component, Component::Normal(_)));
    safe.then(|| dest.join(relative))
}

fn write_entry(
    target: &Path,
    data: &mut dyn Read,
    modified_at: Option<i64>,
) -> Result<(), ArchiveError> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut out = fs::File::create(target)?;
    io::copy(data, &mut out)?;
    drop(out);
    if let Some(mtime) = modified_at {
        let _ = set_file_mtime(target, FileTime::from_unix_time(mtime, 0));
    }
    Ok(())
}
