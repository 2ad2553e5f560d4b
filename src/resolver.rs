//! Recognition of mods that ship without a descriptor.
//!
//! Such archives are identified by content hash against the importing catalog.
//! A match either carries a hand-written descriptor hosted by the service or is
//! expanded per marker file into a synthesized descriptor built from the
//! third party catalog.

use crate::archive::{entry_file_name, entry_parent, ArchiveEntry, ArchiveReader};
use crate::catalog::{ImportingCatalog, ImportingInfo, ThirdPartyCatalog, ThirdPartyModInfo};
use crate::descriptor::{
    parse_virtual_descriptor, HIGHEST_SUPPORTED_DESCRIPTOR_VERSION, SECTION_MOD_INFO,
    SECTION_MOD_MANAGER, SECTION_UPDATES,
};
use crate::game::GameId;
use crate::hashing::{file_size, md5_file};
use crate::ini::IniDocument;
use crate::mods::{JobHeader, Mod};
use std::{io, path::Path};

/// Version stamped on synthesized mods that have an update code; forces an
/// update check the first time the mod is loaded.
pub const VERSION_PLACEHOLDER: &str = "0.001";
/// Version stamped on synthesized mods without an update code.
pub const UNRESOLVED_VERSION: &str = "0.0";

/// Replacement values for the archive's content hash and size.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InspectOverrides {
    pub hash: Option<String>,
    pub size: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveFingerprint {
    pub hash: String,
    pub size: u64,
}

impl ArchiveFingerprint {
    /// Hashes `path` unless `overrides` already supply the value. A zero size
    /// override counts as absent.
    pub fn compute(path: &Path, overrides: &InspectOverrides) -> io::Result<Self> {
        let hash = match overrides.hash.as_deref().map(str::trim) {
            Some(hash) if !hash.is_empty() => hash.to_ascii_lowercase(),
            _ => md5_file(path)?,
        };
        let size = match overrides.size {
            Some(size) if size > 0 => size,
            _ => file_size(path)?,
        };
        Ok(Self { hash, size })
    }
}

pub struct UnofficialResolver<'a, C: ?Sized> {
    catalog: &'a C,
}

impl<'a, C> UnofficialResolver<'a, C>
where
    C: ImportingCatalog + ThirdPartyCatalog + ?Sized,
{
    pub fn new(catalog: &'a C) -> Self {
        Self { catalog }
    }

    /// Resolves `markers` (all implying `game`) into valid mods, in marker order.
    pub fn resolve(
        &self,
        reader: &dyn ArchiveReader,
        markers: &[ArchiveEntry],
        game: GameId,
        overrides: &InspectOverrides,
        on_status: &mut dyn FnMut(&str),
    ) -> Vec<Mod> {
        on_status("Calculating archive hash");
        let fingerprint = match ArchiveFingerprint::compute(reader.path(), overrides) {
            Ok(fingerprint) => fingerprint,
            Err(err) => {
                log::warn!("Could not hash {}: {err}", reader.path().display());
                return Vec::new();
            }
        };

        on_status("Looking up archive in the importing catalog");
        let Some(info) = self.lookup(&fingerprint) else {
            log::warn!(
                "No importing information is available for file with hash {}",
                fingerprint.hash
            );
            return Vec::new();
        };

        if let Some(name) = info.remote_descriptor_name() {
            on_status("Fetching descriptor for this archive");
            if let Some(custom) = self.load_remote_descriptor(reader, name, game) {
                return vec![custom];
            }
        }

        let mut mods: Vec<Mod> = markers
            .iter()
            .filter_map(|marker| {
                self.synthesize_virtual_mod(reader, marker, game, &fingerprint.hash)
            })
            .collect();

        self.enrich_versions(&info, &fingerprint, &mut mods, on_status);
        mods
    }

    fn lookup(&self, fingerprint: &ArchiveFingerprint) -> Option<ImportingInfo> {
        self.catalog
            .importing_infos_by_size(fingerprint.size)
            .into_iter()
            .find(|info| info.md5.trim().eq_ignore_ascii_case(&fingerprint.hash))
    }

    /// A premade descriptor that names no game targets the one implied by the markers.
    fn load_remote_descriptor(
        &self,
        reader: &dyn ArchiveReader,
        name: &str,
        game: GameId,
    ) -> Option<Mod> {
        log::info!("Fetching premade descriptor {name} for this archive");
        let mut text = match self.catalog.fetch_remote_descriptor(name) {
            Ok(text) => text,
            Err(err) => {
                log::warn!("Fetching descriptor {name} failed: {err}");
                return None;
            }
        };
        let mut doc = IniDocument::parse(&text);
        if doc.value(SECTION_MOD_INFO, "game").is_none() {
            doc.set(SECTION_MOD_INFO, "game", game.as_str());
            text = doc.to_string();
        }
        let custom = parse_virtual_descriptor(&text, "", reader);
        if custom.valid {
            Some(custom)
        } else {
            log::warn!(
                "Descriptor {name} is not usable: {}",
                custom.load_failure.as_deref().unwrap_or("unknown reason")
            );
            None
        }
    }

    /// Builds a mod for the DLC folder enclosing `marker`. The marker sits at
    /// `<anchor>/<DLC folder>/<content dir>/<marker>`.
    pub fn synthesize_virtual_mod(
        &self,
        reader: &dyn ArchiveReader,
        marker: &ArchiveEntry,
        game: GameId,
        hash: &str,
    ) -> Option<Mod> {
        let content_dir = entry_parent(&marker.path);
        if content_dir.is_empty() {
            return None;
        }
        let dlc_dir = entry_parent(content_dir);
        if dlc_dir.is_empty() {
            return None;
        }
        let folder = entry_file_name(dlc_dir);

        let Some(info) = self.catalog.third_party_mod_info(folder, game) else {
            log::info!(
                "No third party mod information for importing {folder}. Should this be supported for import?"
            );
            return None;
        };
        log::info!(
            "Third party mod found: {}, preparing virtual descriptor",
            info.modname
        );

        let descriptor = build_virtual_descriptor(&info, folder, game, hash);
        let synthesized =
            parse_virtual_descriptor(&descriptor.to_string(), entry_parent(dlc_dir), reader);
        if !synthesized.valid {
            log::debug!(
                "Virtual descriptor for {folder} rejected: {}",
                synthesized.load_failure.as_deref().unwrap_or("unknown reason")
            );
            return None;
        }
        Some(synthesized)
    }

    /// Stamps one version on every mod of this run: the catalog's, else the
    /// relay's. Remote failures leave the synthesized defaults in place.
    pub fn enrich_versions(
        &self,
        info: &ImportingInfo,
        fingerprint: &ArchiveFingerprint,
        mods: &mut [Mod],
        on_status: &mut dyn FnMut(&str),
    ) {
        if let Some(version) = info.version() {
            stamp_version(mods, version);
            return;
        }

        on_status("Getting additional information about this archive");
        log::info!("Querying the mod relay for additional information");
        match self
            .catalog
            .query_remote_version(&fingerprint.hash, fingerprint.size)
        {
            Ok(Some(fields)) => match fields.get("version").map(|value| value.trim()) {
                Some(version) if !version.is_empty() => {
                    log::info!("Relay reports version {version} for this archive");
                    stamp_version(mods, version);
                }
                _ => log::info!("Relay has no version information for this archive"),
            },
            Ok(None) => log::info!("Relay has no version information for this archive"),
            Err(err) => log::warn!("Relay query failed, keeping default versions: {err}"),
        }
    }
}

fn stamp_version(mods: &mut [Mod], version: &str) {
    for target in mods {
        target.apply_version(version);
    }
}

pub fn build_virtual_descriptor(
    info: &ThirdPartyModInfo,
    folder: &str,
    game: GameId,
    hash: &str,
) -> IniDocument {
    let mut doc = IniDocument::new();
    doc.set(
        SECTION_MOD_MANAGER,
        "cmmver",
        format!("{HIGHEST_SUPPORTED_DESCRIPTOR_VERSION:.1}"),
    );
    doc.set(SECTION_MOD_INFO, "game", game.as_str());
    doc.set(SECTION_MOD_INFO, "modname", info.modname.as_str());
    doc.set(SECTION_MOD_INFO, "moddev", info.moddev.as_str());
    doc.set(SECTION_MOD_INFO, "modsite", info.modsite.as_str());
    doc.set(SECTION_MOD_INFO, "moddesc", info.moddesc.as_str());
    doc.set(SECTION_MOD_INFO, "unofficial", "true");
    match positive_update_code(info.updatecode.as_deref()) {
        Some(code) => {
            doc.set(SECTION_MOD_INFO, "updatecode", code.to_string());
            doc.set(SECTION_MOD_INFO, "modver", VERSION_PLACEHOLDER);
        }
        None => doc.set(SECTION_MOD_INFO, "modver", UNRESOLVED_VERSION),
    }
    let custom = JobHeader::CustomDlc.section_name();
    doc.set(custom, "sourcedirs", folder);
    doc.set(custom, "destdirs", folder);
    doc.set(SECTION_UPDATES, "originalarchivehash", hash);
    doc
}

fn positive_update_code(raw: Option<&str>) -> Option<u32> {
    raw?.trim().parse::<u32>().ok().filter(|code| *code > 0)
}
