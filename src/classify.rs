use crate::archive::ArchiveEntry;
use crate::game::GameId;

pub const DESCRIPTOR_FILENAME: &str = "moddesc.ini";
/// Packaged DLC archive; its presence implies unofficial Mass Effect 3 content.
pub const LEGACY_PACKAGE_FILENAME: &str = "Default.sfar";
/// DLC engine config; its presence implies unofficial Mass Effect 2 content.
pub const ENGINE_CONFIG_FILENAME: &str = "BIOEngine.ini";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    Descriptor,
    LegacyPackage,
    EngineConfig,
}

impl MarkerKind {
    pub fn for_file_name(name: &str) -> Option<Self> {
        if name.eq_ignore_ascii_case(DESCRIPTOR_FILENAME) {
            Some(MarkerKind::Descriptor)
        } else if name.eq_ignore_ascii_case(LEGACY_PACKAGE_FILENAME) {
            Some(MarkerKind::LegacyPackage)
        } else if name.eq_ignore_ascii_case(ENGINE_CONFIG_FILENAME) {
            Some(MarkerKind::EngineConfig)
        } else {
            None
        }
    }

    /// Game implied by an unofficial marker.
    pub fn game(self) -> Option<GameId> {
        match self {
            MarkerKind::Descriptor => None,
            MarkerKind::LegacyPackage => Some(GameId::Me3),
            MarkerKind::EngineConfig => Some(GameId::Me2),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateBuckets {
    pub descriptors: Vec<ArchiveEntry>,
    pub legacy_packages: Vec<ArchiveEntry>,
    pub engine_configs: Vec<ArchiveEntry>,
}

impl CandidateBuckets {
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
            && self.legacy_packages.is_empty()
            && self.engine_configs.is_empty()
    }

    /// Unofficial markers to resolve, with the game they imply. Packaged DLC
    /// archives win over engine configs when both are present.
    pub fn legacy_markers(&self) -> Option<(&[ArchiveEntry], GameId)> {
        if !self.legacy_packages.is_empty() {
            Some((&self.legacy_packages, GameId::Me3))
        } else if !self.engine_configs.is_empty() {
            Some((&self.engine_configs, GameId::Me2))
        } else {
            None
        }
    }
}

pub fn classify_entries(entries: &[ArchiveEntry]) -> CandidateBuckets {
    let mut buckets = CandidateBuckets::default();
    for entry in entries {
        if entry.is_dir {
            continue;
        }
        let bucket = match MarkerKind::for_file_name(entry.file_name()) {
            Some(MarkerKind::Descriptor) => &mut buckets.descriptors,
            Some(MarkerKind::LegacyPackage) => &mut buckets.legacy_packages,
            Some(MarkerKind::EngineConfig) => &mut buckets.engine_configs,
            None => continue,
        };
        bucket.push(entry.clone());
    }
    log::debug!(
        "Classified {} entries: {} descriptor(s), {} packaged DLC, {} engine config(s)",
        entries.len(),
        buckets.descriptors.len(),
        buckets.legacy_packages.len(),
        buckets.engine_configs.len()
    );
    buckets
}
