use crate::archive::{open_archive, ArchiveReader};
use crate::catalog::{ImportingCatalog, ThirdPartyCatalog};
use crate::classify::classify_entries;
use crate::descriptor::read_descriptor_entry;
use crate::error::ArchiveError;
use crate::mods::Mod;
use crate::resolver::UnofficialResolver;
use std::path::Path;

pub use crate::resolver::InspectOverrides;

/// Narration and discoveries from one inspection run, in the order they happen.
#[derive(Debug, Clone)]
pub enum InspectEvent {
    Status(String),
    ModFound(Mod),
}

/// Finds the importable mods inside an archive.
///
/// Archives with descriptors are read as-is and never consulted against the
/// catalog. Archives without descriptors but with packaged DLC or engine config
/// markers go through [`UnofficialResolver`].
pub struct Inspector<'a, C: ?Sized> {
    catalog: &'a C,
}

impl<'a, C> Inspector<'a, C>
where
    C: ImportingCatalog + ThirdPartyCatalog + ?Sized,
{
    pub fn new(catalog: &'a C) -> Self {
        Self { catalog }
    }

    /// Opens `path` and inspects it. Only failing to open the archive is an error;
    /// the handle is closed before returning.
    pub fn inspect_archive(
        &self,
        path: &Path,
        overrides: &InspectOverrides,
        on_event: &mut dyn FnMut(InspectEvent),
    ) -> Result<Vec<Mod>, ArchiveError> {
        on_event(InspectEvent::Status(format!("Opening {}", path.display())));
        let mut archive = open_archive(path)?;
        Ok(self.inspect_reader(archive.as_mut(), overrides, on_event))
    }

    pub fn inspect_reader(
        &self,
        reader: &mut dyn ArchiveReader,
        overrides: &InspectOverrides,
        on_event: &mut dyn FnMut(InspectEvent),
    ) -> Vec<Mod> {
        let buckets = classify_entries(reader.entries());
        let mut found = Vec::new();

        if !buckets.descriptors.is_empty() {
            for entry in &buckets.descriptors {
                on_event(InspectEvent::Status(format!("Reading {}", entry.path)));
                let parsed = read_descriptor_entry(reader, entry);
                if !parsed.valid {
                    continue;
                }
                log::info!("Found mod {} in {}", parsed.name, entry.path);
                on_event(InspectEvent::ModFound(parsed.clone()));
                found.push(parsed);
            }
        } else if let Some((markers, game)) = buckets.legacy_markers() {
            log::info!(
                "No descriptors in {}; checking {} unofficial {} marker(s)",
                reader.path().display(),
                markers.len(),
                game
            );
            let resolver = UnofficialResolver::new(self.catalog);
            let mut narrate = |status: &str| on_event(InspectEvent::Status(status.to_string()));
            let resolved = resolver.resolve(&*reader, markers, game, overrides, &mut narrate);
            for resolved_mod in resolved {
                log::info!("Found unofficial mod {}", resolved_mod.name);
                on_event(InspectEvent::ModFound(resolved_mod.clone()));
                found.push(resolved_mod);
            }
        } else {
            log::info!(
                "{} has no descriptors and no DLC content files, so it contains no mods",
                reader.path().display()
            );
        }

        let summary = match found.len() {
            0 => "No importable mods found".to_string(),
            1 => "Found 1 mod".to_string(),
            count => format!("Found {count} mods"),
        };
        on_event(InspectEvent::Status(summary));
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::memory::MemoryArchive;
    use crate::catalog::testing::MockCatalog;
    use crate::catalog::{CatalogManifests, ImportingInfo, ThirdPartyModInfo};
    use crate::game::GameId;

    const EXAMPLE: &[u8] = b"[ModInfo]\nmodname = Example\nmodver = 1.0\n[BASEGAME]\nmoddir = data\n";
    const HASH: &str = "d41d8cd98f00b204e9800998ecf8427e";

    fn overrides() -> InspectOverrides {
        InspectOverrides {
            hash: Some(HASH.to_string()),
            size: Some(100),
        }
    }

    fn known_archive_catalog() -> MockCatalog {
        let mut manifests = CatalogManifests::new();
        manifests.insert_importing(ImportingInfo {
            md5: HASH.to_string(),
            size: 100,
            ..Default::default()
        });
        for (game, folder) in [(GameId::Me3, "DLC_MOD"), (GameId::Me2, "DLC_MOD_Two")] {
            manifests.insert_third_party(
                game,
                folder,
                ThirdPartyModInfo {
                    modname: format!("{folder} mod"),
                    ..Default::default()
                },
            );
        }
        MockCatalog::new(manifests).with_relay_version("1.1")
    }

    fn found_names(events: &[InspectEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|event| match event {
                InspectEvent::ModFound(found) => Some(found.name.clone()),
                InspectEvent::Status(_) => None,
            })
            .collect()
    }

    fn inspect(
        catalog: &MockCatalog,
        archive: &mut MemoryArchive,
    ) -> (Vec<Mod>, Vec<InspectEvent>) {
        let mut events = Vec::new();
        let mods = Inspector::new(catalog).inspect_reader(archive, &overrides(), &mut |event| {
            events.push(event)
        });
        (mods, events)
    }

    #[test]
    fn descriptor_archive_reports_each_valid_mod_once() {
        let catalog = known_archive_catalog();
        let mut archive = MemoryArchive::new("X.zip")
            .with_file("ModInfo/moddesc.ini", EXAMPLE)
            .with_file("ModInfo/data/file.bin", b"payload");

        let (mods, events) = inspect(&catalog, &mut archive);
        assert_eq!(mods.len(), 1);
        assert_eq!(found_names(&events), vec!["Example"]);
        assert_eq!(catalog.size_lookups(), 0);
    }

    #[test]
    fn non_ascii_sibling_entries_do_not_break_parsing() {
        let catalog = known_archive_catalog();
        let mut archive = MemoryArchive::new("X.zip")
            .with_file("ModInfo/moddesc.ini", EXAMPLE)
            .with_file("ModInfo/daté/readme.txt", b"notes")
            .with_file("ModInfo/data/file.bin", b"payload");

        let (mods, events) = inspect(&catalog, &mut archive);
        assert_eq!(found_names(&events), vec!["Example"]);
        assert!(mods[0].valid);
    }

    #[test]
    fn descriptors_take_precedence_over_markers() {
        let catalog = known_archive_catalog();
        let mut archive = MemoryArchive::new("Mixed.zip")
            .with_file("ModInfo/moddesc.ini", EXAMPLE)
            .with_file("ModInfo/data/file.bin", b"payload")
            .with_file("DLC_MOD/CookedPCConsole/Default.sfar", b"sfar")
            .with_file("Wrap/DLC_MOD_Two/CookedPC/BIOEngine.ini", b"");

        let (mods, _) = inspect(&catalog, &mut archive);
        assert_eq!(mods.len(), 1);
        assert_eq!(mods[0].name, "Example");
        assert_eq!(catalog.size_lookups(), 0);
        assert_eq!(catalog.network_calls(), 0);
    }

    #[test]
    fn invalid_descriptors_are_skipped_silently() {
        let catalog = known_archive_catalog();
        let mut archive = MemoryArchive::new("X.zip")
            .with_file("Broken/moddesc.ini", b"[ModInfo]\nmoddev = nobody\n")
            .with_file("ModInfo/moddesc.ini", EXAMPLE)
            .with_file("ModInfo/data/file.bin", b"payload")
            .with_file("DLC_MOD/CookedPCConsole/Default.sfar", b"sfar");

        let (mods, events) = inspect(&catalog, &mut archive);
        assert_eq!(found_names(&events), vec!["Example"]);
        assert!(mods.iter().all(|m| m.valid));
        assert_eq!(catalog.size_lookups(), 0);
    }

    #[test]
    fn clean_archive_yields_nothing_without_contacting_services() {
        let catalog = known_archive_catalog();
        let mut archive = MemoryArchive::new("Clean.zip")
            .with_file("readme.txt", b"hello")
            .with_dir("textures");

        let (mods, events) = inspect(&catalog, &mut archive);
        assert!(mods.is_empty());
        assert!(found_names(&events).is_empty());
        assert_eq!(catalog.size_lookups(), 0);
        assert_eq!(catalog.network_calls(), 0);
    }

    #[test]
    fn unknown_packaged_dlc_yields_nothing() {
        let catalog = MockCatalog::new(CatalogManifests::new());
        let mut archive =
            MemoryArchive::new("Y.zip").with_file("DLC_MOD/CookedPCConsole/Default.sfar", b"sfar");

        let (mods, _) = inspect(&catalog, &mut archive);
        assert!(mods.is_empty());
        assert_eq!(catalog.size_lookups(), 1);
        assert_eq!(catalog.network_calls(), 0);
    }

    #[test]
    fn known_packaged_dlc_is_streamed_with_enriched_version() {
        let catalog = known_archive_catalog();
        let mut archive = MemoryArchive::new("Z.zip")
            .with_file("Z/DLC_MOD/CookedPCConsole/Default.sfar", b"sfar");

        let (mods, events) = inspect(&catalog, &mut archive);
        assert_eq!(found_names(&events), vec!["DLC_MOD mod"]);
        assert_eq!(mods[0].version_string, "1.1");
        assert_eq!(mods[0].game, GameId::Me3);
        assert_eq!(catalog.relay_queries(), 1);
    }

    #[test]
    fn engine_config_markers_resolve_for_the_second_game() {
        let catalog = known_archive_catalog();
        let mut archive = MemoryArchive::new("Two.zip")
            .with_file("Wrap/DLC_MOD_Two/CookedPC/BIOEngine.ini", b"")
            .with_file("Wrap/DLC_MOD_Two/CookedPC/Mount.dlc", b"mount");

        let (mods, _) = inspect(&catalog, &mut archive);
        assert_eq!(mods.len(), 1);
        assert_eq!(mods[0].game, GameId::Me2);
        assert_eq!(mods[0].anchor_dir, "Wrap");
    }

    #[test]
    fn status_narration_ends_with_summary() {
        let catalog = known_archive_catalog();
        let mut archive = MemoryArchive::new("Clean.zip").with_file("readme.txt", b"hello");
        let (_, events) = inspect(&catalog, &mut archive);
        assert!(matches!(
            events.last(),
            Some(InspectEvent::Status(text)) if text == "No importable mods found"
        ));
    }

    #[test]
    fn unopenable_archive_is_an_error() {
        let catalog = known_archive_catalog();
        let result = Inspector::new(&catalog).inspect_archive(
            Path::new("/nonexistent/archive.zip"),
            &InspectOverrides::default(),
            &mut |_| {},
        );
        assert!(matches!(result, Err(ArchiveError::Open { .. })));
    }
}
