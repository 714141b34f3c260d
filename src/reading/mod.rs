use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_PATH_FILE: &str = "/boot/d0logging/lastreadingpath.conf";
pub const PATH_FILE_ENV: &str = "M2L_LASTREADING_PATH";

/// Address of the data block entry carrying the meter serial number.
pub const SERIAL_ADDRESS: &str = "0.0.0";

#[derive(Error, Debug)]
pub enum ReadingError {
    #[error("unable to read reading file")]
    Io(#[from] std::io::Error),
    #[error("unable to parse reading file")]
    Json(#[from] serde_json::Error),
    #[error("last-reading path file is empty")]
    EmptyPathFile,
    #[error("no data block entry with address {address:?}")]
    NotFound { address: String },
}

#[derive(Deserialize, Debug, Clone)]
pub struct ObisEntry {
    pub address: String,
    pub value: String,
    #[serde(default)]
    pub unit: String,
}

#[derive(Deserialize, Debug)]
struct DataMessage {
    #[serde(rename = "meter ID")]
    meter_id: String,
    #[serde(rename = "data block")]
    data_block: Vec<ObisEntry>,
}

// Document shape written by the d0 reader.
#[derive(Deserialize, Debug)]
struct ReadingDocument {
    #[serde(rename = "data message")]
    data_message: DataMessage,
}

/// One meter readout, consumed immediately after parsing.
#[derive(Debug)]
pub struct MeterReading {
    pub meter_id: String,
    pub entries: Vec<ObisEntry>,
}

/// The fields of a readout that end up in the uplink payload, resolved
/// against the configured OBIS selector.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedReading {
    pub serial: String,
    pub selector: String,
    pub value: String,
    pub unit: String,
}

impl MeterReading {
    pub fn load(path: &Path) -> Result<Self, ReadingError> {
        let contents = fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> Result<Self, ReadingError> {
        let doc: ReadingDocument = serde_json::from_str(contents)?;
        Ok(MeterReading {
            meter_id: doc.data_message.meter_id,
            entries: doc.data_message.data_block,
        })
    }

    /// Picks the serial number entry and the entry matching the selector.
    /// Both must be present; an absent register is an error, never an
    /// empty string.
    pub fn resolve(&self, selector: &str) -> Result<ResolvedReading, ReadingError> {
        let serial = self.lookup(SERIAL_ADDRESS)?;
        let selected = self.lookup(selector)?;

        Ok(ResolvedReading {
            serial: serial.value.clone(),
            selector: selector.to_string(),
            value: selected.value.clone(),
            unit: selected.unit.clone(),
        })
    }

    fn lookup(&self, address: &str) -> Result<&ObisEntry, ReadingError> {
        self.entries
            .iter()
            .find(|entry| entry.address == address)
            .ok_or_else(|| ReadingError::NotFound { address: address.to_string() })
    }
}

/// Reads the path file naming the current reading JSON. The `-1` suffix
/// selects the temporary file the d0 reader keeps while it rewrites the
/// live one.
pub fn last_reading_path(path_file: &Path) -> Result<PathBuf, ReadingError> {
    let contents = fs::read_to_string(path_file)?;
    let line = contents.lines().next().unwrap_or("").trim();
    if line.is_empty() {
        return Err(ReadingError::EmptyPathFile);
    }
    Ok(PathBuf::from(format!("{}-1", line)))
}

/// Path of the path file itself, overridable through the environment.
pub fn path_file() -> PathBuf {
    match env::var(PATH_FILE_ENV) {
        Ok(path) => PathBuf::from(path),
        Err(_) => PathBuf::from(DEFAULT_PATH_FILE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"{
        "data message": {
            "meter ID": "ELS-1234",
            "data block": [
                { "address": "0.0.0", "value": "12345678", "unit": "" },
                { "address": "1.8.0", "value": "004711.5", "unit": "kWh" },
                { "address": "1.2.3", "value": "00042", "unit": "m3" }
            ]
        }
    }"#;

    #[test]
    fn test_parse_reading_document() {
        let reading = MeterReading::from_json(SAMPLE).unwrap();
        assert_eq!(reading.meter_id, "ELS-1234");
        assert_eq!(reading.entries.len(), 3);
        assert_eq!(reading.entries[1].address, "1.8.0");
        assert_eq!(reading.entries[1].unit, "kWh");
    }

    #[test]
    fn test_resolve_selector_and_serial() {
        let reading = MeterReading::from_json(SAMPLE).unwrap();
        let resolved = reading.resolve("1.2.3").unwrap();
        assert_eq!(resolved.serial, "12345678");
        assert_eq!(resolved.selector, "1.2.3");
        assert_eq!(resolved.value, "00042");
        assert_eq!(resolved.unit, "m3");
    }

    #[test]
    fn test_missing_selector_is_not_found() {
        let reading = MeterReading::from_json(SAMPLE).unwrap();
        let err = reading.resolve("9.9.9").unwrap_err();
        match err {
            ReadingError::NotFound { address } => assert_eq!(address, "9.9.9"),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_missing_serial_is_not_found() {
        let without_serial = SAMPLE.replacen("0.0.0", "0.0.1", 1);
        let reading = MeterReading::from_json(&without_serial).unwrap();
        let err = reading.resolve("1.2.3").unwrap_err();
        assert!(matches!(err, ReadingError::NotFound { .. }));
    }

    #[test]
    fn test_entry_without_unit_parses() {
        let reading = MeterReading::from_json(
            r#"{ "data message": { "meter ID": "x",
                 "data block": [ { "address": "0.0.0", "value": "1" } ] } }"#,
        )
        .unwrap();
        assert_eq!(reading.entries[0].unit, "");
    }

    #[test]
    fn test_last_reading_path_appends_suffix() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "/var/run/d0/lastreading.json").unwrap();
        let path = last_reading_path(file.path()).unwrap();
        assert_eq!(path, PathBuf::from("/var/run/d0/lastreading.json-1"));
    }

    #[test]
    fn test_empty_path_file_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file).unwrap();
        assert!(matches!(last_reading_path(file.path()), Err(ReadingError::EmptyPathFile)));
    }
}
