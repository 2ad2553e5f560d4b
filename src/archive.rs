use crate::error::ArchiveError;
use sevenz_rust::{Password, SevenZReader};
use std::{
    fs::File,
    io::{self, Read},
    path::{Path, PathBuf},
};
use time::{Date, Month, PrimitiveDateTime, Time as TimeOfDay};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub path: String,
    pub is_dir: bool,
}

impl ArchiveEntry {
    pub fn new(path: &str, is_dir: bool) -> Self {
        Self {
            path: normalize_entry_path(path),
            is_dir,
        }
    }

    pub fn file_name(&self) -> &str {
        entry_file_name(&self.path)
    }
}

/// A file entry handed to [`ArchiveReader::visit_files`] callbacks.
pub struct VisitedFile<'a> {
    pub path: &'a str,
    pub modified_at: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    SevenZ,
}

impl ArchiveFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "zip" => Some(Self::Zip),
            "7z" => Some(Self::SevenZ),
            _ => None,
        }
    }
}

pub trait ArchiveReader {
    fn path(&self) -> &Path;

    /// Entries in the archive's native enumeration order.
    fn entries(&self) -> &[ArchiveEntry];

    fn read_entry(&mut self, entry_path: &str) -> Result<Vec<u8>, ArchiveError>;

    /// Streams every file entry accepted by `accept` through `visit`, once each,
    /// in enumeration order.
    fn visit_files(
        &mut self,
        accept: &mut dyn FnMut(&str) -> bool,
        visit: &mut dyn FnMut(VisitedFile<'_>, &mut dyn Read) -> Result<(), ArchiveError>,
    ) -> Result<(), ArchiveError>;
}

pub fn open_archive(path: &Path) -> Result<Box<dyn ArchiveReader>, ArchiveError> {
    match ArchiveFormat::from_path(path) {
        Some(ArchiveFormat::Zip) => Ok(Box::new(ZipArchiveReader::open(path)?)),
        Some(ArchiveFormat::SevenZ) => Ok(Box::new(SevenZArchiveReader::open(path)?)),
        None => Err(ArchiveError::UnsupportedFormat(path.to_path_buf())),
    }
}

fn open_file(path: &Path) -> Result<File, ArchiveError> {
    File::open(path).map_err(|source| ArchiveError::Open {
        path: path.to_path_buf(),
        source,
    })
}

pub struct ZipArchiveReader {
    path: PathBuf,
    archive: zip::ZipArchive<File>,
    entries: Vec<ArchiveEntry>,
    raw_names: Vec<String>,
}

impl ZipArchiveReader {
    pub fn open(path: &Path) -> Result<Self, ArchiveError> {
        let file = open_file(path)?;
        let mut archive = zip::ZipArchive::new(file)?;
        let mut entries = Vec::with_capacity(archive.len());
        let mut raw_names = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let entry = archive.by_index_raw(i)?;
            entries.push(ArchiveEntry::new(entry.name(), entry.is_dir()));
            raw_names.push(entry.name().to_string());
        }
        Ok(Self {
            path: path.to_path_buf(),
            archive,
            entries,
            raw_names,
        })
    }
}

impl ArchiveReader for ZipArchiveReader {
    fn path(&self) -> &Path {
        &self.path
    }

    fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    fn read_entry(&mut self, entry_path: &str) -> Result<Vec<u8>, ArchiveError> {
        let wanted = normalize_entry_path(entry_path);
        let index = self
            .entries
            .iter()
            .position(|entry| !entry.is_dir && entry.path == wanted)
            .ok_or_else(|| ArchiveError::EntryNotFound(wanted.clone()))?;
        let mut file = self.archive.by_name(&self.raw_names[index])?;
        let mut bytes = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    fn visit_files(
        &mut self,
        accept: &mut dyn FnMut(&str) -> bool,
        visit: &mut dyn FnMut(VisitedFile<'_>, &mut dyn Read) -> Result<(), ArchiveError>,
    ) -> Result<(), ArchiveError> {
        for i in 0..self.archive.len() {
            let entry = &self.entries[i];
            if entry.is_dir || !accept(&entry.path) {
                continue;
            }
            let mut file = self.archive.by_index(i)?;
            let modified_at = file.last_modified().and_then(zip_time_to_unix);
            visit(
                VisitedFile {
                    path: &entry.path,
                    modified_at,
                },
                &mut file,
            )?;
        }
        Ok(())
    }
}

fn zip_time_to_unix(dt: zip::DateTime) -> Option<i64> {
    let month = Month::try_from(dt.month()).ok()?;
    let date = Date::from_calendar_date(dt.year() as i32, month, dt.day()).ok()?;
    let time = TimeOfDay::from_hms(dt.hour(), dt.minute(), dt.second()).ok()?;
    let datetime = PrimitiveDateTime::new(date, time).assume_utc();
    Some(datetime.unix_timestamp())
}

pub struct SevenZArchiveReader {
    path: PathBuf,
    reader: SevenZReader<File>,
    entries: Vec<ArchiveEntry>,
}

impl SevenZArchiveReader {
    pub fn open(path: &Path) -> Result<Self, ArchiveError> {
        let file = open_file(path)?;
        let len = file.metadata()?.len();
        let reader = SevenZReader::new(file, len, Password::empty())?;
        let entries = reader
            .archive()
            .files
            .iter()
            .map(|entry| ArchiveEntry::new(entry.name(), entry.is_directory()))
            .collect();
        Ok(Self {
            path: path.to_path_buf(),
            reader,
            entries,
        })
    }
}

impl ArchiveReader for SevenZArchiveReader {
    fn path(&self) -> &Path {
        &self.path
    }

    fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    fn read_entry(&mut self, entry_path: &str) -> Result<Vec<u8>, ArchiveError> {
        let wanted = normalize_entry_path(entry_path);
        let mut found: Option<Vec<u8>> = None;
        let mut failure: Option<io::Error> = None;
        self.reader.for_each_entries(|entry, data| {
            if entry.is_directory() || normalize_entry_path(entry.name()) != wanted {
                if let Err(err) = io::copy(data, &mut io::sink()) {
                    failure = Some(err);
                    return Ok(false);
                }
                return Ok(true);
            }
            let mut bytes = Vec::new();
            match data.read_to_end(&mut bytes) {
                Ok(_) => found = Some(bytes),
                Err(err) => failure = Some(err),
            }
            Ok(false)
        })?;
        if let Some(err) = failure {
            return Err(err.into());
        }
        found.ok_or(ArchiveError::EntryNotFound(wanted))
    }

    fn visit_files(
        &mut self,
        accept: &mut dyn FnMut(&str) -> bool,
        visit: &mut dyn FnMut(VisitedFile<'_>, &mut dyn Read) -> Result<(), ArchiveError>,
    ) -> Result<(), ArchiveError> {
        let mut failure: Option<ArchiveError> = None;
        self.reader.for_each_entries(|entry, data| {
            let path = normalize_entry_path(entry.name());
            let outcome = if entry.is_directory() || !accept(&path) {
                io::copy(data, &mut io::sink())
                    .map(|_| ())
                    .map_err(ArchiveError::from)
            } else {
                visit(
                    VisitedFile {
                        path: &path,
                        modified_at: None,
                    },
                    data,
                )
            };
            match outcome {
                Ok(()) => Ok(true),
                Err(err) => {
                    failure = Some(err);
                    Ok(false)
                }
            }
        })?;
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

pub fn normalize_entry_path(path: &str) -> String {
    let normalized = path.replace('\\', "/");
    normalized
        .trim_start_matches("./")
        .trim_matches('/')
        .to_string()
}

pub fn entry_file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Parent directory of an entry path, or an empty string at the archive root.
pub fn entry_parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

pub fn join_entry(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

/// Path of `path` relative to `dir`, if `path` lies inside it. Case-insensitive.
pub fn strip_entry_dir<'a>(path: &'a str, dir: &str) -> Option<&'a str> {
    if dir.is_empty() {
        return Some(path);
    }
    let head = path.get(..dir.len())?;
    let rest = path[dir.len()..].strip_prefix('/')?;
    if head.eq_ignore_ascii_case(dir) && !rest.is_empty() {
        Some(rest)
    } else {
        None
    }
}

#[cfg(test)]
pub(crate) mod memory {
    use super::*;
    use std::collections::HashMap;

    /// In-memory archive used by unit tests.
    pub struct MemoryArchive {
        path: PathBuf,
        entries: Vec<ArchiveEntry>,
        contents: HashMap<String, Vec<u8>>,
    }

    impl MemoryArchive {
        pub fn new(path: &str) -> Self {
            Self {
                path: PathBuf::from(path),
                entries: Vec::new(),
                contents: HashMap::new(),
            }
        }

        pub fn with_file(mut self, path: &str, contents: &[u8]) -> Self {
            let entry = ArchiveEntry::new(path, false);
            self.contents.insert(entry.path.clone(), contents.to_vec());
            self.entries.push(entry);
            self
        }

        pub fn with_dir(mut self, path: &str) -> Self {
            self.entries.push(ArchiveEntry::new(path, true));
            self
        }
    }

    impl ArchiveReader for MemoryArchive {
        fn path(&self) -> &Path {
            &self.path
        }

        fn entries(&self) -> &[ArchiveEntry] {
            &self.entries
        }

        fn read_entry(&mut self, entry_path: &str) -> Result<Vec<u8>, ArchiveError> {
            let wanted = normalize_entry_path(entry_path);
            self.contents
                .get(&wanted)
                .cloned()
                .ok_or(ArchiveError::EntryNotFound(wanted))
        }

        fn visit_files(
            &mut self,
            accept: &mut dyn FnMut(&str) -> bool,
            visit: &mut dyn FnMut(VisitedFile<'_>, &mut dyn Read) -> Result<(), ArchiveError>,
        ) -> Result<(), ArchiveError> {
            for entry in &self.entries {
                if entry.is_dir || !accept(&entry.path) {
                    continue;
                }
                let bytes = self.contents.get(&entry.path).cloned().unwrap_or_default();
                let mut cursor = io::Cursor::new(bytes);
                visit(
                    VisitedFile {
                        path: &entry.path,
                        modified_at: None,
                    },
                    &mut cursor,
                )?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_backslashes_and_trailing_separators() {
        assert_eq!(
            normalize_entry_path(r"DLC_MOD\CookedPCConsole\Default.sfar"),
            "DLC_MOD/CookedPCConsole/Default.sfar"
        );
        assert_eq!(normalize_entry_path("./ModInfo/"), "ModInfo");
    }

    #[test]
    fn parent_and_file_name() {
        assert_eq!(entry_parent("a/b/c.ini"), "a/b");
        assert_eq!(entry_parent("c.ini"), "");
        assert_eq!(entry_file_name("a/b/c.ini"), "c.ini");
        assert_eq!(entry_file_name("c.ini"), "c.ini");
    }

    #[test]
    fn strip_dir_requires_separator_boundary() {
        assert_eq!(strip_entry_dir("Mod/DLC_X/a.bin", "mod"), Some("DLC_X/a.bin"));
        assert_eq!(strip_entry_dir("Modded/a.bin", "Mod"), None);
        assert_eq!(strip_entry_dir("Mod", "Mod"), None);
        assert_eq!(strip_entry_dir("a.bin", ""), Some("a.bin"));
        assert_eq!(strip_entry_dir("Mod/", "Mod"), None);
    }

    #[test]
    fn strip_dir_tolerates_multibyte_names() {
        assert_eq!(strip_entry_dir("ModInfo/daté/readme.txt", "ModInfo/data"), None);
        assert_eq!(strip_entry_dir("é/a.bin", "x"), None);
        assert_eq!(strip_entry_dir("Modé/a.bin", "Modé"), Some("a.bin"));
    }

    #[test]
    fn format_follows_extension() {
        assert_eq!(
            ArchiveFormat::from_path(Path::new("x.ZIP")),
            Some(ArchiveFormat::Zip)
        );
        assert_eq!(
            ArchiveFormat::from_path(Path::new("x.7z")),
            Some(ArchiveFormat::SevenZ)
        );
        assert_eq!(ArchiveFormat::from_path(Path::new("x.rar")), None);
    }

    #[test]
    fn unsupported_extension_is_rejected_before_opening() {
        let err = open_archive(Path::new("does-not-exist.rar")).err();
        assert!(matches!(err, Some(ArchiveError::UnsupportedFormat(_))));
    }

    #[test]
    fn missing_zip_is_an_open_error() {
        let err = open_archive(Path::new("/nonexistent/dir/x.zip")).err();
        assert!(matches!(err, Some(ArchiveError::Open { .. })));
    }
}
