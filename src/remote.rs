use crate::catalog::{
    flatten_relay_fields, parse_importing_manifest, parse_third_party_manifest, CatalogManifests,
    ImportingCatalog, ImportingInfo, ThirdPartyCatalog, ThirdPartyModInfo,
};
use crate::config::{AppConfig, CatalogEndpoints};
use crate::error::CatalogError;
use crate::game::GameId;
use serde_json::Value;
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::OnceLock,
    time::Duration,
};

const USER_AGENT: &str = concat!("tweaksmith/", env!("CARGO_PKG_VERSION"));
const IMPORTING_CACHE_FILE: &str = "importing_manifest.json";
const THIRD_PARTY_CACHE_FILE: &str = "third_party_manifest.json";

/// Blocking client for the remote catalog service.
///
/// Manifests are downloaded once per process and mirrored to `cache_dir`; when
/// the service cannot be reached the mirrored copy is served instead.
pub struct RemoteCatalog {
    endpoints: CatalogEndpoints,
    cache_dir: PathBuf,
    offline: bool,
    timeout: Duration,
    manifests: OnceLock<CatalogManifests>,
}

impl RemoteCatalog {
    pub fn new(endpoints: CatalogEndpoints, cache_dir: PathBuf, offline: bool) -> Self {
        Self {
            endpoints,
            cache_dir,
            offline,
            timeout: Duration::from_secs(15),
            manifests: OnceLock::new(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let mut catalog = Self::new(
            config.catalog.clone(),
            config.cache_dir.join("catalog"),
            config.offline,
        );
        catalog.timeout = config.timeout();
        catalog
    }

    pub fn manifests(&self) -> &CatalogManifests {
        self.manifests.get_or_init(|| self.load_manifests())
    }

    fn load_manifests(&self) -> CatalogManifests {
        let importing = self
            .load_manifest(
                IMPORTING_CACHE_FILE,
                &self.endpoints.importing_manifest_url,
                parse_importing_manifest,
            )
            .unwrap_or_default();
        let third_party = self
            .load_manifest(
                THIRD_PARTY_CACHE_FILE,
                &self.endpoints.third_party_manifest_url,
                parse_third_party_manifest,
            )
            .unwrap_or_default();
        let manifests = CatalogManifests::from_parts(importing, third_party);
        log::info!(
            "Catalog loaded: {} importing record(s), {} third party mod(s)",
            manifests.importing_count(),
            manifests.third_party_count()
        );
        manifests
    }

    fn load_manifest<T>(
        &self,
        cache_name: &str,
        url: &str,
        parse: fn(&str) -> Result<T, CatalogError>,
    ) -> Option<T> {
        let cache_path = self.cache_dir.join(cache_name);
        if !self.offline {
            match self.fetch_text(url).and_then(|text| Ok((parse(&text)?, text))) {
                Ok((value, text)) => {
                    if let Err(err) = write_cache(&cache_path, &text) {
                        log::warn!("Failed to cache {cache_name}: {err}");
                    }
                    return Some(value);
                }
                Err(err) => log::warn!("Fetching {url} failed, using cached copy: {err}"),
            }
        }

        let raw = match fs::read_to_string(&cache_path) {
            Ok(raw) => raw,
            Err(_) => {
                log::warn!("No cached copy of {cache_name} is available");
                return None;
            }
        };
        match parse(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                log::warn!("Cached {cache_name} is unreadable: {err}");
                None
            }
        }
    }

    fn agent(&self) -> ureq::Agent {
        ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout_read(self.timeout)
            .timeout_write(self.timeout)
            .build()
    }

    fn fetch_text(&self, url: &str) -> Result<String, CatalogError> {
        if self.offline {
            return Err(CatalogError::Offline);
        }
        let response = self.agent().get(url).set("User-Agent", USER_AGENT).call()?;
        response
            .into_string()
            .map_err(|err| CatalogError::Http(err.to_string()))
    }
}

impl ImportingCatalog for RemoteCatalog {
    fn importing_infos_by_size(&self, size: u64) -> Vec<ImportingInfo> {
        self.manifests().importing_by_size(size)
    }

    fn fetch_remote_descriptor(&self, name: &str) -> Result<String, CatalogError> {
        let url = format!(
            "{}/{}",
            self.endpoints.descriptor_base_url.trim_end_matches('/'),
            name
        );
        self.fetch_text(&url)
    }

    fn query_remote_version(
        &self,
        hash: &str,
        size: u64,
    ) -> Result<Option<HashMap<String, String>>, CatalogError> {
        if self.offline {
            return Err(CatalogError::Offline);
        }
        let response = match self
            .agent()
            .get(&self.endpoints.relay_url)
            .query("md5", hash)
            .query("size", &size.to_string())
            .set("User-Agent", USER_AGENT)
            .call()
        {
            Ok(response) => response,
            Err(ureq::Error::Status(404, _)) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let fields: HashMap<String, Value> = response
            .into_json()
            .map_err(|err| CatalogError::Decode(err.to_string()))?;
        if fields.is_empty() {
            return Ok(None);
        }
        Ok(Some(flatten_relay_fields(fields)))
    }
}

impl ThirdPartyCatalog for RemoteCatalog {
    fn third_party_mod_info(&self, folder: &str, game: GameId) -> Option<ThirdPartyModInfo> {
        self.manifests().third_party(folder, game)
    }
}

fn write_cache(path: &Path, text: &str) -> Result<(), CatalogError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let temp = path.with_extension("json.tmp");
    fs::write(&temp, text)?;
    if path.exists() {
        let _ = fs::remove_file(path);
    }
    fs::rename(&temp, path)?;
    Ok(())
}
