use crate::error::CatalogError;
use crate::game::GameId;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Catalog record for a known archive, keyed by size and disambiguated by hash.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportingInfo {
    pub md5: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub servermoddescname: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub version: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub updatecode: Option<String>,
}

impl ImportingInfo {
    pub fn remote_descriptor_name(&self) -> Option<&str> {
        non_empty(self.servermoddescname.as_deref())
    }

    pub fn version(&self) -> Option<&str> {
        non_empty(self.version.as_deref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThirdPartyModInfo {
    pub modname: String,
    #[serde(default)]
    pub moddev: String,
    #[serde(default)]
    pub modsite: String,
    #[serde(default)]
    pub moddesc: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub updatecode: Option<String>,
}

pub trait ImportingCatalog {
    /// All importing records published for archives of exactly `size` bytes.
    fn importing_infos_by_size(&self, size: u64) -> Vec<ImportingInfo>;

    fn fetch_remote_descriptor(&self, name: &str) -> Result<String, CatalogError>;

    /// Extra metadata the service holds for an archive, if any.
    fn query_remote_version(
        &self,
        hash: &str,
        size: u64,
    ) -> Result<Option<HashMap<String, String>>, CatalogError>;
}

pub trait ThirdPartyCatalog {
    fn third_party_mod_info(&self, folder: &str, game: GameId) -> Option<ThirdPartyModInfo>;
}

pub trait Catalog: ImportingCatalog + ThirdPartyCatalog + Send + Sync {}

impl<T: ImportingCatalog + ThirdPartyCatalog + Send + Sync> Catalog for T {}

/// The two published manifests, held in memory.
#[derive(Debug, Clone, Default)]
pub struct CatalogManifests {
    importing: HashMap<u64, Vec<ImportingInfo>>,
    third_party: HashMap<GameId, HashMap<String, ThirdPartyModInfo>>,
}

impl CatalogManifests {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(
        importing: HashMap<u64, Vec<ImportingInfo>>,
        third_party: HashMap<GameId, HashMap<String, ThirdPartyModInfo>>,
    ) -> Self {
        let mut manifests = Self {
            importing,
            third_party: HashMap::new(),
        };
        for (game, mods) in third_party {
            for (folder, info) in mods {
                manifests.insert_third_party(game, &folder, info);
            }
        }
        manifests
    }

    pub fn from_json(importing_json: &str, third_party_json: &str) -> Result<Self, CatalogError> {
        Ok(Self::from_parts(
            parse_importing_manifest(importing_json)?,
            parse_third_party_manifest(third_party_json)?,
        ))
    }

    pub fn insert_importing(&mut self, info: ImportingInfo) {
        self.importing.entry(info.size).or_default().push(info);
    }

    pub fn insert_third_party(&mut self, game: GameId, folder: &str, info: ThirdPartyModInfo) {
        self.third_party
            .entry(game)
            .or_default()
            .insert(folder.to_ascii_uppercase(), info);
    }

    pub fn importing_count(&self) -> usize {
        self.importing.values().map(Vec::len).sum()
    }

    pub fn third_party_count(&self) -> usize {
        self.third_party.values().map(HashMap::len).sum()
    }

    pub fn importing_by_size(&self, size: u64) -> Vec<ImportingInfo> {
        self.importing.get(&size).cloned().unwrap_or_default()
    }

    pub fn third_party(&self, folder: &str, game: GameId) -> Option<ThirdPartyModInfo> {
        self.third_party
            .get(&game)?
            .get(&folder.to_ascii_uppercase())
            .cloned()
    }
}

/// Offline use: lookups come from the manifests, remote calls always fail.
impl ImportingCatalog for CatalogManifests {
    fn importing_infos_by_size(&self, size: u64) -> Vec<ImportingInfo> {
        self.importing_by_size(size)
    }

    fn fetch_remote_descriptor(&self, _name: &str) -> Result<String, CatalogError> {
        Err(CatalogError::Offline)
    }

    fn query_remote_version(
        &self,
        _hash: &str,
        _size: u64,
    ) -> Result<Option<HashMap<String, String>>, CatalogError> {
        Err(CatalogError::Offline)
    }
}

impl ThirdPartyCatalog for CatalogManifests {
    fn third_party_mod_info(&self, folder: &str, game: GameId) -> Option<ThirdPartyModInfo> {
        self.third_party(folder, game)
    }
}

/// `{"<size>": [ImportingInfo, ...]}`; keys that are not sizes are skipped.
pub fn parse_importing_manifest(
    json: &str,
) -> Result<HashMap<u64, Vec<ImportingInfo>>, CatalogError> {
    let raw: HashMap<String, Vec<ImportingInfo>> = serde_json::from_str(json)?;
    let mut manifest = HashMap::new();
    for (key, mut infos) in raw {
        let Ok(size) = key.trim().parse::<u64>() else {
            log::debug!("Skipping importing manifest key {key:?}");
            continue;
        };
        for info in &mut infos {
            info.size = size;
        }
        manifest.insert(size, infos);
    }
    Ok(manifest)
}

/// `{"ME3": {"DLC_FOLDER": ThirdPartyModInfo, ...}, ...}`; unknown games are skipped.
pub fn parse_third_party_manifest(
    json: &str,
) -> Result<HashMap<GameId, HashMap<String, ThirdPartyModInfo>>, CatalogError> {
    let raw: HashMap<String, HashMap<String, ThirdPartyModInfo>> = serde_json::from_str(json)?;
    let mut manifest = HashMap::new();
    for (key, mods) in raw {
        match GameId::parse(&key) {
            Some(game) => {
                manifest.insert(game, mods);
            }
            None => log::debug!("Skipping third party manifest for unknown game {key:?}"),
        }
    }
    Ok(manifest)
}

/// Relay responses carry loosely typed values; flatten them to strings.
pub fn flatten_relay_fields(fields: HashMap<String, Value>) -> HashMap<String, String> {
    fields
        .into_iter()
        .filter_map(|(key, value)| value_to_string(value).map(|value| (key, value)))
        .collect()
}

fn value_to_string(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        other => Some(other.to_string()),
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(value_to_string))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Manifest-backed catalog with scripted remote answers and call counters.
    #[derive(Default)]
    pub struct MockCatalog {
        pub manifests: CatalogManifests,
        remote_descriptor: Option<String>,
        relay: Option<HashMap<String, String>>,
        relay_fails: bool,
        size_lookups: AtomicUsize,
        descriptor_fetches: AtomicUsize,
        relay_queries: AtomicUsize,
    }

    impl MockCatalog {
        pub fn new(manifests: CatalogManifests) -> Self {
            Self {
                manifests,
                ..Default::default()
            }
        }

        pub fn with_remote_descriptor(mut self, text: &str) -> Self {
            self.remote_descriptor = Some(text.to_string());
            self
        }

        pub fn with_relay_version(mut self, version: &str) -> Self {
            let mut fields = HashMap::new();
            fields.insert("version".to_string(), version.to_string());
            self.relay = Some(fields);
            self
        }

        pub fn with_failing_relay(mut self) -> Self {
            self.relay_fails = true;
            self
        }

        pub fn size_lookups(&self) -> usize {
            self.size_lookups.load(Ordering::SeqCst)
        }

        pub fn descriptor_fetches(&self) -> usize {
            self.descriptor_fetches.load(Ordering::SeqCst)
        }

        pub fn relay_queries(&self) -> usize {
            self.relay_queries.load(Ordering::SeqCst)
        }

        pub fn network_calls(&self) -> usize {
            self.descriptor_fetches() + self.relay_queries()
        }
    }

    impl ImportingCatalog for MockCatalog {
        fn importing_infos_by_size(&self, size: u64) -> Vec<ImportingInfo> {
            self.size_lookups.fetch_add(1, Ordering::SeqCst);
            self.manifests.importing_by_size(size)
        }

        fn fetch_remote_descriptor(&self, name: &str) -> Result<String, CatalogError> {
            self.descriptor_fetches.fetch_add(1, Ordering::SeqCst);
            self.remote_descriptor
                .clone()
                .ok_or_else(|| CatalogError::Http(format!("404 for {name}")))
        }

        fn query_remote_version(
            &self,
            _hash: &str,
            _size: u64,
        ) -> Result<Option<HashMap<String, String>>, CatalogError> {
            self.relay_queries.fetch_add(1, Ordering::SeqCst);
            if self.relay_fails {
                return Err(CatalogError::Http("connection refused".to_string()));
            }
            Ok(self.relay.clone())
        }
    }

    impl ThirdPartyCatalog for MockCatalog {
        fn third_party_mod_info(&self, folder: &str, game: GameId) -> Option<ThirdPartyModInfo> {
            self.manifests.third_party(folder, game)
        }
    }
}
