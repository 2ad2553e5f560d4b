use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};
use tweaksmith::{
    archive::open_archive,
    catalog::{CatalogManifests, ImportingInfo, ThirdPartyModInfo},
    extract::{extract_selected, ExistingDestination, ExtractEvent, ExtractOptions},
    game::GameId,
    hashing::{file_size, md5_file},
    inspect::{InspectEvent, InspectOverrides, Inspector},
    mods::Mod,
};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;

const EXAMPLE_DESCRIPTOR: &str = "[ModManager]\ncmmver = 6.0\n\n[ModInfo]\nmodname = Example\nmoddev = Someone\nmodver = 1.2\n\n[CUSTOMDLC]\nsourcedirs = DLC_MOD_Example\ndestdirs = DLC_MOD_Example\n";

fn write_zip(path: &Path, files: &[(&str, &[u8])]) {
    let mut writer = zip::ZipWriter::new(fs::File::create(path).unwrap());
    for (name, contents) in files {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .unwrap();
        writer.write_all(contents).unwrap();
    }
    writer.finish().unwrap();
}

fn inspect(catalog: &CatalogManifests, archive: &Path) -> (Vec<Mod>, Vec<String>) {
    let mut found = Vec::new();
    let mods = Inspector::new(catalog)
        .inspect_archive(archive, &InspectOverrides::default(), &mut |event| {
            if let InspectEvent::ModFound(m) = event {
                found.push(m.name);
            }
        })
        .unwrap();
    (mods, found)
}

fn library_files(root: &Path) -> Vec<String> {
    let mut files: Vec<String> = WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| {
            entry
                .path()
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect();
    files.sort();
    files
}

fn options(library: PathBuf, existing: ExistingDestination) -> ExtractOptions {
    ExtractOptions {
        library_dir: library,
        compress_packages: false,
        existing,
    }
}

fn unofficial_catalog(archive: &Path, version: Option<&str>) -> CatalogManifests {
    let mut catalog = CatalogManifests::new();
    catalog.insert_importing(ImportingInfo {
        md5: md5_file(archive).unwrap(),
        size: file_size(archive).unwrap(),
        version: version.map(str::to_string),
        ..Default::default()
    });
    catalog.insert_third_party(
        GameId::Me3,
        "DLC_MOD_Unofficial",
        ThirdPartyModInfo {
            modname: "Unofficial Pack".to_string(),
            moddev: "Modder".to_string(),
            modsite: "https://example.invalid/pack".to_string(),
            moddesc: "Adds armor".to_string(),
            updatecode: Some("0".to_string()),
        },
    );
    catalog
}

fn write_unofficial_archive(path: &Path) {
    write_zip(
        path,
        &[
            (
                "Unofficial Pack/DLC_MOD_Unofficial/CookedPCConsole/Default.sfar",
                b"sfar-bytes",
            ),
            (
                "Unofficial Pack/DLC_MOD_Unofficial/CookedPCConsole/Mount.dlc",
                b"mount",
            ),
            ("Unofficial Pack/readme.txt", b"read me"),
        ],
    );
}

#[test]
fn descriptor_archive_inspects_and_extracts() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("X.zip");
    write_zip(
        &archive,
        &[
            ("Example/moddesc.ini", EXAMPLE_DESCRIPTOR.as_bytes()),
            ("Example/DLC_MOD_Example/CookedPCConsole/Default.sfar", b"sfar"),
            ("Example/DLC_MOD_Example/CookedPCConsole/PCConsoleTOC.bin", b"toc"),
            ("Example/screenshots/shot.png", b"png"),
        ],
    );

    let (mods, found) = inspect(&CatalogManifests::new(), &archive);
    assert_eq!(found, vec!["Example"]);
    assert_eq!(mods[0].version_string, "1.2");

    let library = dir.path().join("library");
    let mut percents = Vec::new();
    let extracted = extract_selected(
        &archive,
        &mods,
        &options(library.clone(), ExistingDestination::Replace),
        &mut |event| {
            if let ExtractEvent::Progress(percent) = event {
                percents.push(percent);
            }
        },
    )
    .unwrap();

    assert_eq!(extracted.len(), 1);
    assert_eq!(
        library_files(&library),
        vec![
            "ME3/Example/DLC_MOD_Example/CookedPCConsole/Default.sfar",
            "ME3/Example/DLC_MOD_Example/CookedPCConsole/PCConsoleTOC.bin",
            "ME3/Example/moddesc.ini",
        ]
    );
    assert!(percents.iter().all(|percent| *percent <= 100));
    assert_eq!(percents.last(), Some(&100));
}

#[test]
fn unofficial_archive_is_recognised_by_hash() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("Unofficial.zip");
    write_unofficial_archive(&archive);
    let catalog = unofficial_catalog(&archive, Some("2.5"));

    let (mods, found) = inspect(&catalog, &archive);
    assert_eq!(found, vec!["Unofficial Pack"]);
    let pack = &mods[0];
    assert!(pack.unofficial && pack.is_virtual);
    assert_eq!(pack.version_string, "2.5");
    assert_eq!(pack.developer.as_deref(), Some("Modder"));
    assert_eq!(pack.archive_hash, Some(md5_file(&archive).unwrap()));

    let library = dir.path().join("library");
    extract_selected(
        &archive,
        &mods,
        &options(library.clone(), ExistingDestination::Replace),
        &mut |_| {},
    )
    .unwrap();
    assert_eq!(
        library_files(&library),
        vec![
            "ME3/Unofficial Pack/DLC_MOD_Unofficial/CookedPCConsole/Default.sfar",
            "ME3/Unofficial Pack/DLC_MOD_Unofficial/CookedPCConsole/Mount.dlc",
            "ME3/Unofficial Pack/moddesc.ini",
        ]
    );
    let written = fs::read_to_string(library.join("ME3/Unofficial Pack/moddesc.ini")).unwrap();
    assert!(written.contains("unofficial = true"));
    assert!(written.contains("originalarchivehash"));
}

#[test]
fn unreachable_relay_keeps_default_version() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("Unofficial.zip");
    write_unofficial_archive(&archive);
    let catalog = unofficial_catalog(&archive, None);

    let (mods, _) = inspect(&catalog, &archive);
    assert_eq!(mods.len(), 1);
    assert_eq!(mods[0].parsed_version, 0.0);
}

#[test]
fn unknown_archive_yields_no_mods() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("Y.zip");
    write_zip(&archive, &[("DLC_MOD/CookedPCConsole/Default.sfar", b"sfar")]);

    let (mods, found) = inspect(&CatalogManifests::new(), &archive);
    assert!(mods.is_empty());
    assert!(found.is_empty());
}

#[test]
fn replace_policy_clears_previous_import() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("X.zip");
    write_zip(
        &archive,
        &[
            ("moddesc.ini", EXAMPLE_DESCRIPTOR.as_bytes()),
            ("DLC_MOD_Example/CookedPCConsole/Default.sfar", b"new"),
        ],
    );
    let library = dir.path().join("library");
    let stale = library.join("ME3/Example/stale.txt");
    fs::create_dir_all(stale.parent().unwrap()).unwrap();
    fs::write(&stale, "old").unwrap();

    let (mods, _) = inspect(&CatalogManifests::new(), &archive);
    extract_selected(
        &archive,
        &mods,
        &options(library.clone(), ExistingDestination::Replace),
        &mut |_| {},
    )
    .unwrap();
    assert!(!stale.exists());

    fs::write(&stale, "old").unwrap();
    extract_selected(
        &archive,
        &mods,
        &options(library.clone(), ExistingDestination::Merge),
        &mut |_| {},
    )
    .unwrap();
    assert!(stale.exists());
    assert_eq!(
        fs::read(library.join("ME3/Example/DLC_MOD_Example/CookedPCConsole/Default.sfar"))
            .unwrap(),
        b"new"
    );
}

fn write_seven_zip(path: &Path, files: &[(&str, &[u8])]) {
    let staging = tempfile::tempdir().unwrap();
    for (name, contents) in files {
        let target = staging.path().join(name);
        fs::create_dir_all(target.parent().unwrap()).unwrap();
        fs::write(target, contents).unwrap();
    }
    sevenz_rust::compress_to_path(staging.path(), path).unwrap();
}

#[test]
fn seven_zip_archive_inspects_and_extracts() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("X.7z");
    write_seven_zip(
        &archive,
        &[
            ("Example/moddesc.ini", EXAMPLE_DESCRIPTOR.as_bytes()),
            ("Example/DLC_MOD_Example/CookedPCConsole/Default.sfar", b"sfar"),
            ("Example/DLC_MOD_Example/CookedPCConsole/PCConsoleTOC.bin", b"toc"),
            ("Example/readme.txt", b"read me"),
        ],
    );

    let mut reader = open_archive(&archive).unwrap();
    assert_eq!(
        reader
            .read_entry("Example/DLC_MOD_Example/CookedPCConsole/PCConsoleTOC.bin")
            .unwrap(),
        b"toc"
    );
    assert!(reader.read_entry("Example/missing.bin").is_err());

    let (mods, found) = inspect(&CatalogManifests::new(), &archive);
    assert_eq!(found, vec!["Example"]);

    let library = dir.path().join("library");
    extract_selected(
        &archive,
        &mods,
        &options(library.clone(), ExistingDestination::Replace),
        &mut |_| {},
    )
    .unwrap();
    assert_eq!(
        library_files(&library),
        vec![
            "ME3/Example/DLC_MOD_Example/CookedPCConsole/Default.sfar",
            "ME3/Example/DLC_MOD_Example/CookedPCConsole/PCConsoleTOC.bin",
            "ME3/Example/moddesc.ini",
        ]
    );
    assert_eq!(
        fs::read(library.join("ME3/Example/DLC_MOD_Example/CookedPCConsole/Default.sfar"))
            .unwrap(),
        b"sfar"
    );
}
