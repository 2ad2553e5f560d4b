//! Descriptor (`moddesc.ini`) parsing and validation.
//!
//! Parsing never fails outright: every call yields a [`Mod`] whose `valid` flag
//! says whether it may be offered for import, with `load_failure` set otherwise.

use crate::archive::{entry_parent, join_entry, strip_entry_dir, ArchiveEntry, ArchiveReader};
use crate::game::GameId;
use crate::ini::IniDocument;
use crate::mods::{JobHeader, Mod, ModJob};
use std::path::Path;

/// Highest `cmmver` this engine understands.
pub const HIGHEST_SUPPORTED_DESCRIPTOR_VERSION: f64 = 6.0;
const DEFAULT_DESCRIPTOR_VERSION: f64 = 1.0;

pub const SECTION_MOD_MANAGER: &str = "ModManager";
pub const SECTION_MOD_INFO: &str = "ModInfo";
pub const SECTION_UPDATES: &str = "UPDATES";

/// Parses descriptor text whose paths are relative to `anchor_dir`.
///
/// When `entries` is given, every job source directory must exist in the archive.
pub fn parse_descriptor(
    text: &str,
    anchor_dir: &str,
    archive_path: &Path,
    entries: Option<&[ArchiveEntry]>,
) -> Mod {
    let mut parsed = Mod::new(archive_path, anchor_dir, text);
    match populate(&mut parsed, &IniDocument::parse(text), entries) {
        Ok(()) => parsed.valid = true,
        Err(reason) => {
            log::debug!(
                "Descriptor in {} ({}) is not valid: {reason}",
                archive_path.display(),
                if anchor_dir.is_empty() { "<root>" } else { anchor_dir }
            );
            parsed.valid = false;
            parsed.load_failure = Some(reason);
        }
    }
    parsed
}

/// Loads a descriptor stored inside the archive, anchored at its parent directory.
pub fn read_descriptor_entry(reader: &mut dyn ArchiveReader, entry: &ArchiveEntry) -> Mod {
    let anchor = entry_parent(&entry.path).to_string();
    let text = match reader.read_entry(&entry.path) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(err) => {
            let mut failed = Mod::new(reader.path(), &anchor, "");
            failed.descriptor_entry = Some(entry.path.clone());
            failed.load_failure = Some(format!("could not read {}: {err}", entry.path));
            return failed;
        }
    };
    let mut parsed = parse_descriptor(&text, &anchor, reader.path(), Some(reader.entries()));
    parsed.descriptor_entry = Some(entry.path.clone());
    parsed
}

/// Parses a descriptor that was built in memory or fetched remotely.
pub fn parse_virtual_descriptor(text: &str, anchor_dir: &str, reader: &dyn ArchiveReader) -> Mod {
    let mut parsed = parse_descriptor(text, anchor_dir, reader.path(), Some(reader.entries()));
    parsed.is_virtual = true;
    parsed
}

fn populate(
    target: &mut Mod,
    doc: &IniDocument,
    entries: Option<&[ArchiveEntry]>,
) -> Result<(), String> {
    target.name = doc
        .value(SECTION_MOD_INFO, "modname")
        .ok_or("missing [ModInfo] modname")?
        .to_string();

    target.descriptor_version = match doc.value(SECTION_MOD_MANAGER, "cmmver") {
        Some(raw) => raw
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .ok_or_else(|| format!("unreadable cmmver {raw:?}"))?,
        None => DEFAULT_DESCRIPTOR_VERSION,
    };
    if target.descriptor_version > HIGHEST_SUPPORTED_DESCRIPTOR_VERSION {
        return Err(format!(
            "requires descriptor version {}, newest supported is {}",
            target.descriptor_version, HIGHEST_SUPPORTED_DESCRIPTOR_VERSION
        ));
    }

    if let Some(raw) = doc.value(SECTION_MOD_INFO, "game") {
        target.game = GameId::parse(raw).ok_or_else(|| format!("unknown game {raw:?}"))?;
    }

    if let Some(version) = doc.value(SECTION_MOD_INFO, "modver") {
        target.apply_version(version);
    }
    target.developer = doc.value(SECTION_MOD_INFO, "moddev").map(str::to_string);
    target.site = doc.value(SECTION_MOD_INFO, "modsite").map(str::to_string);
    target.description = doc.value(SECTION_MOD_INFO, "moddesc").map(str::to_string);
    target.update_code = doc
        .value(SECTION_MOD_INFO, "updatecode")
        .and_then(|raw| raw.parse::<u32>().ok())
        .filter(|code| *code > 0);
    target.unofficial = doc
        .value(SECTION_MOD_INFO, "unofficial")
        .is_some_and(|raw| raw.eq_ignore_ascii_case("true"));
    target.archive_hash = doc
        .value(SECTION_UPDATES, "originalarchivehash")
        .map(str::to_string);

    target.jobs = parse_jobs(doc)?;
    if target.jobs.is_empty() {
        return Err("descriptor has no install jobs".to_string());
    }

    if let Some(entries) = entries {
        for job in &target.jobs {
            for dir in &job.source_dirs {
                let full = join_entry(&target.anchor_dir, dir);
                if !directory_exists(entries, &full) {
                    return Err(format!(
                        "[{}] source directory {full} is not in the archive",
                        job.header.section_name()
                    ));
                }
            }
        }
    }

    Ok(())
}

fn parse_jobs(doc: &IniDocument) -> Result<Vec<ModJob>, String> {
    let mut jobs = Vec::new();

    for header in JobHeader::moddir_headers() {
        if let Some(dir) = doc.value(header.section_name(), "moddir") {
            let dir = dir.trim_matches(|ch| ch == '/' || ch == '\\').to_string();
            jobs.push(ModJob {
                header,
                source_dirs: vec![dir.clone()],
                dest_dirs: vec![dir],
            });
        }
    }

    let custom = JobHeader::CustomDlc.section_name();
    if doc.has_section(custom) {
        let source_dirs = split_list(doc.get(custom, "sourcedirs"));
        let dest_dirs = split_list(doc.get(custom, "destdirs"));
        if source_dirs.is_empty() {
            return Err("[CUSTOMDLC] has no sourcedirs".to_string());
        }
        if source_dirs.len() != dest_dirs.len() {
            return Err(format!(
                "[CUSTOMDLC] lists {} sourcedirs but {} destdirs",
                source_dirs.len(),
                dest_dirs.len()
            ));
        }
        jobs.push(ModJob {
            header: JobHeader::CustomDlc,
            source_dirs,
            dest_dirs,
        });
    }

    Ok(jobs)
}

fn split_list(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or_default()
        .split(';')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn directory_exists(entries: &[ArchiveEntry], dir: &str) -> bool {
    entries.iter().any(|entry| {
        strip_entry_dir(&entry.path, dir).is_some()
            || (entry.is_dir && entry.path.eq_ignore_ascii_case(dir))
    })
}
