use crate::extract::{ExistingDestination, ExtractOptions};
use anyhow::{Context, Result};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEndpoints {
    #[serde(default = "default_importing_manifest_url")]
    pub importing_manifest_url: String,
    #[serde(default = "default_third_party_manifest_url")]
    pub third_party_manifest_url: String,
    #[serde(default = "default_descriptor_base_url")]
    pub descriptor_base_url: String,
    #[serde(default = "default_relay_url")]
    pub relay_url: String,
}

impl Default for CatalogEndpoints {
    fn default() -> Self {
        Self {
            importing_manifest_url: default_importing_manifest_url(),
            third_party_manifest_url: default_third_party_manifest_url(),
            descriptor_base_url: default_descriptor_base_url(),
            relay_url: default_relay_url(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Root of the managed mod library; one subdirectory per game.
    #[serde(default)]
    pub library_dir: PathBuf,
    #[serde(default)]
    pub cache_dir: PathBuf,
    #[serde(default)]
    pub catalog: CatalogEndpoints,
    #[serde(default)]
    pub offline: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub compress_packages: bool,
    #[serde(default)]
    pub existing_destination: ExistingDestination,
}

impl AppConfig {
    pub fn with_data_dir(data_dir: &Path) -> Self {
        Self {
            library_dir: data_dir.join("library"),
            cache_dir: data_dir.join("cache"),
            catalog: CatalogEndpoints::default(),
            offline: false,
            timeout_secs: default_timeout_secs(),
            compress_packages: false,
            existing_destination: ExistingDestination::default(),
        }
    }

    pub fn load_or_create() -> Result<Self> {
        let base_dir = base_data_dir()?;
        fs::create_dir_all(&base_dir).context("create app data dir")?;
        Self::load_or_create_at(&base_dir.join(CONFIG_FILE))
    }

    pub fn load_or_create_at(path: &Path) -> Result<Self> {
        let data_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        if path.exists() {
            let raw = fs::read_to_string(path).context("read app config")?;
            let mut config: AppConfig = serde_json::from_str(&raw).context("parse app config")?;
            config.fill_defaults(&data_dir);
            return Ok(config);
        }

        let config = Self::with_data_dir(&data_dir);
        config.save_to(path)?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("create config dir")?;
        }
        let raw = serde_json::to_string_pretty(self).context("serialize app config")?;
        fs::write(path, raw).context("write app config")?;
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn extract_options(&self) -> ExtractOptions {
        ExtractOptions {
            library_dir: self.library_dir.clone(),
            compress_packages: self.compress_packages,
            existing: self.existing_destination,
        }
    }

    fn fill_defaults(&mut self, data_dir: &Path) {
        if self.library_dir.as_os_str().is_empty() {
            self.library_dir = data_dir.join("library");
        }
        if self.cache_dir.as_os_str().is_empty() {
            self.cache_dir = data_dir.join("cache");
        }
    }
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_importing_manifest_url() -> String {
    "https://me3tweaks.com/modmanager/services/thirdpartyimportingservice?allgames=true".to_string()
}

fn default_third_party_manifest_url() -> String {
    "https://me3tweaks.com/modmanager/services/thirdpartyidentificationservice?allgames=true"
        .to_string()
}

fn default_descriptor_base_url() -> String {
    "https://me3tweaks.com/modmanager/services/thirdpartyimportingservice/moddesc".to_string()
}

fn default_relay_url() -> String {
    "https://me3tweaks.com/mods/dlc_mods/importingmodrelay".to_string()
}

fn base_data_dir() -> Result<PathBuf> {
    let base = BaseDirs::new().context("resolve home dir")?;
    Ok(base.data_local_dir().join("tweaksmith"))
}
