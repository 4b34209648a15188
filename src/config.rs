use std::env;
use std::time::Duration;

use log::error;
use serde::Deserialize;

use crate::error::FolioError;
use crate::store::FILES;

pub const CONFIG_VAR: &str = "FOLIO_CONFIG";

fn default_namespace() -> String {
    FILES.to_string()
}
fn default_auth_url() -> String {
    "https://identitytoolkit.googleapis.com/v1".to_string()
}
fn default_debounce_ms() -> u64 {
    300
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    /// Base url of the realtime store, without trailing `.json`
    pub url: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    #[serde(default = "default_auth_url")]
    pub url: String,
    pub api_key: String,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AssistantConfig {
    /// Full generation endpoint
    pub url: String,
    pub api_key: String,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FolioConfig {
    pub store: StoreConfig,
    #[serde(default)]
    pub auth: Option<AuthConfig>,
    #[serde(default)]
    pub assistant: Option<AssistantConfig>,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl FolioConfig {
    pub fn from_json(config_str: &str) -> Result<Self, FolioError> {
        serde_json::from_str::<FolioConfig>(config_str).map_err(|err| {
            error!("Error parsing config:\n{}\n\n{}", err, config_str);
            FolioError::bad_request(&format!("Invalid config: {}", err))
        })
    }

    /// Reads the config from the `FOLIO_CONFIG` environment variable
    pub fn from_env() -> Result<Self, FolioError> {
        let Ok(config_str) = env::var(CONFIG_VAR) else {
            error!("Config not found! Set env variable \"{}\"", CONFIG_VAR);
            return Err(FolioError::bad_request("Config not found"));
        };
        Self::from_json(&config_str)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}
