use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use lorawan::keys::{AppEui, AppSKey, DevEui, NewSKey as NwkSKey};
use serde::Deserialize;
use thiserror::Error;

use crate::hex_utils::{self, HexError};

pub const DEFAULT_CONFIG_PATH: &str = "/boot/d0logging/lorawan.conf";
pub const CONFIG_PATH_ENV: &str = "M2L_LORAWAN_CONFIG";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unable to read config file")]
    Io(#[from] std::io::Error),
    #[error("unable to parse config file")]
    Json(#[from] serde_json::Error),
    #[error("missing config field {0:?}")]
    MissingField(&'static str),
    #[error("config field {field:?} is not valid hex")]
    InvalidEncoding {
        field: &'static str,
        #[source]
        source: HexError,
    },
    #[error("deviceAddress is not a hexadecimal integer")]
    InvalidAddress(#[source] std::num::ParseIntError),
}

// Raw JSON shape of the config file. Every field is optional here so a
// missing one is reported by name rather than as a generic parse error.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawConfig {
    device_eui: Option<String>,
    application_eui: Option<String>,
    device_address: Option<String>,
    network_session_key: Option<String>,
    app_session_key: Option<String>,
    obis_selection: Option<String>,
}

/// Static transmission parameters, loaded once at startup and immutable
/// afterwards. The device address stays an integer; the EUIs and session
/// keys are decoded into the radio stack's key types.
#[derive(Clone, Debug)]
pub struct LorawanConfig {
    pub device_eui: DevEui,
    pub application_eui: AppEui,
    pub device_address: u32,
    pub network_session_key: NwkSKey,
    pub app_session_key: AppSKey,
    pub obis_selection: String,
}

impl LorawanConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_json::from_str(contents)?;

        let device_eui = decode_field::<8>(raw.device_eui, "deviceEui")?;
        let application_eui = decode_field::<8>(raw.application_eui, "applicationEui")?;
        let network_session_key =
            decode_field::<16>(raw.network_session_key, "networkSessionKey")?;
        let app_session_key = decode_field::<16>(raw.app_session_key, "appSessionKey")?;

        let address = raw.device_address.ok_or(ConfigError::MissingField("deviceAddress"))?;
        let device_address =
            u32::from_str_radix(address.trim(), 16).map_err(ConfigError::InvalidAddress)?;

        let obis_selection =
            raw.obis_selection.ok_or(ConfigError::MissingField("obisSelection"))?;

        Ok(LorawanConfig {
            device_eui: DevEui::from(device_eui),
            application_eui: AppEui::from(application_eui),
            device_address,
            network_session_key: NwkSKey::from(network_session_key),
            app_session_key: AppSKey::from(app_session_key),
            obis_selection,
        })
    }
}

fn decode_field<const N: usize>(
    value: Option<String>,
    field: &'static str,
) -> Result<[u8; N], ConfigError> {
    let value = value.ok_or(ConfigError::MissingField(field))?;
    hex_utils::decode_hex_array::<N>(&value)
        .map_err(|source| ConfigError::InvalidEncoding { field, source })
}

/// Path of the config file, overridable through the environment.
pub fn config_path() -> PathBuf {
    match env::var(CONFIG_PATH_ENV) {
        Ok(path) => PathBuf::from(path),
        Err(_) => PathBuf::from(DEFAULT_CONFIG_PATH),
    }
}
