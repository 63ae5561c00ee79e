//! Turning resolved frames into addressed sensor readings.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{BridgeError, Result};
use crate::mapping::OPTO_SLOTS;

/// Smallest frame that carries a reading: address byte plus two value bytes.
pub const MIN_MESSAGE_LEN: usize = 3;

/// How a channel's value is handled once decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Published as-is.
    Value,
    /// Re-centred and fed to the opto mapping for sensor slot `index`.
    Opto { index: u8 },
}

/// A named channel in the address table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelEntry {
    pub name: String,
    pub kind: ChannelKind,
}

impl ChannelEntry {
    fn value(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ChannelKind::Value,
        }
    }

    fn opto(name: impl Into<String>, index: u8) -> Self {
        Self {
            name: name.into(),
            kind: ChannelKind::Opto { index },
        }
    }
}

/// One decoded reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Message<'a> {
    pub address: u8,
    pub name: &'a str,
    pub kind: ChannelKind,
    pub value: u16,
}

/// Why a frame didn't produce a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InterpretError {
    /// Fewer than three bytes.
    #[error("malformed frame ({len} bytes, need at least {MIN_MESSAGE_LEN})")]
    MalformedFrame { len: usize },

    /// First byte isn't in the address table.
    #[error("unknown address {0}")]
    UnknownAddress(u8),
}

const ANALOG_PINS: [u8; 10] = [27, 33, 32, 14, 4, 0, 15, 13, 36, 39];
const BUTTON_PINS: [u8; 2] = [34, 35];
const OPTO_BASE: u8 = 99;
// Firmware reports the opto sensors in this slot order.
const OPTO_SLOT_ORDER: [u8; OPTO_SLOTS] = [0, 2, 1, 3, 4, 5];
const CAP_BASE: u8 = 110;
const CAP_PADS: u8 = 12;
const IMU_BASE: u8 = 150;
const IMU_AXES: [&str; 7] = [
    "/imu/accelX",
    "/imu/accelY",
    "/imu/accelZ",
    "/imu/gyroX",
    "/imu/gyroY",
    "/imu/gyroZ",
    "/imu/temp",
];

/// Address byte to channel lookup.
///
/// Built once at startup and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressTable {
    entries: BTreeMap<u8, ChannelEntry>,
}

impl Default for AddressTable {
    fn default() -> Self {
        let mut entries = BTreeMap::new();
        for (i, pin) in ANALOG_PINS.iter().enumerate() {
            entries.insert(*pin, ChannelEntry::value(format!("/analog{i}")));
        }
        for (i, pin) in BUTTON_PINS.iter().enumerate() {
            entries.insert(*pin, ChannelEntry::value(format!("/button{i}")));
        }
        for (offset, slot) in OPTO_SLOT_ORDER.iter().enumerate() {
            entries.insert(OPTO_BASE + offset as u8, ChannelEntry::opto("/opto", *slot));
        }
        for i in 0..CAP_PADS {
            entries.insert(CAP_BASE + i, ChannelEntry::value(format!("/cap{i}")));
        }
        for (offset, name) in IMU_AXES.iter().enumerate() {
            entries.insert(IMU_BASE + offset as u8, ChannelEntry::value(*name));
        }
        Self { entries }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct AddressMapFile {
    channels: Vec<ChannelSpec>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ChannelSpec {
    address: u8,
    name: String,
    #[serde(default)]
    opto: Option<u8>,
}

impl AddressTable {
    /// Parse an address map.
    ///
    /// ```json
    /// { "channels": [
    ///     { "address": 27, "name": "/analog0" },
    ///     { "address": 99, "name": "/opto", "opto": 0 }
    /// ] }
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        let file: AddressMapFile = serde_json::from_str(json)?;
        let mut entries = BTreeMap::new();
        for spec in file.channels {
            if !spec.name.starts_with('/') {
                return Err(BridgeError::Config(format!(
                    "channel name {:?} must start with '/'",
                    spec.name
                )));
            }
            let kind = match spec.opto {
                Some(index) if usize::from(index) >= OPTO_SLOTS => {
                    return Err(BridgeError::Config(format!(
                        "opto slot {index} out of range (0..{OPTO_SLOTS})"
                    )));
                }
                Some(index) => ChannelKind::Opto { index },
                None => ChannelKind::Value,
            };
            let entry = ChannelEntry {
                name: spec.name,
                kind,
            };
            if entries.insert(spec.address, entry).is_some() {
                return Err(BridgeError::Config(format!(
                    "address {} listed more than once",
                    spec.address
                )));
            }
        }
        if entries.is_empty() {
            return Err(BridgeError::Config("no channels".to_string()));
        }
        debug!(channels = entries.len(), "loaded address map");
        Ok(Self { entries })
    }

    /// Load an address map from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| BridgeError::ReadConfig {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Decode one resolved frame.
    ///
    /// Bytes after the value are ignored.
    pub fn interpret(&self, frame: &[u8]) -> std::result::Result<Message<'_>, InterpretError> {
        let &[address, hi, lo, ..] = frame else {
            return Err(InterpretError::MalformedFrame { len: frame.len() });
        };
        let entry = self
            .entries
            .get(&address)
            .ok_or(InterpretError::UnknownAddress(address))?;
        Ok(Message {
            address,
            name: &entry.name,
            kind: entry.kind,
            value: u16::from_be_bytes([hi, lo]),
        })
    }

    pub fn get(&self, address: u8) -> Option<&ChannelEntry> {
        self.entries.get(&address)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in address order.
    pub fn iter(&self) -> impl Iterator<Item = (u8, &ChannelEntry)> {
        self.entries.iter().map(|(addr, entry)| (*addr, entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_is_big_endian() {
        let table = AddressTable::default();
        let msg = table.interpret(&[14, 0x01, 0x2C]).unwrap();
        assert_eq!(msg.name, "/analog3");
        assert_eq!(msg.value, 300);
        assert_eq!(msg.kind, ChannelKind::Value);
    }

    #[test]
    fn test_trailing_bytes_ignored() {
        let table = AddressTable::default();
        let msg = table.interpret(&[27, 0xFF, 0xFE, 0x00, 0x11]).unwrap();
        assert_eq!(msg.name, "/analog0");
        assert_eq!(msg.value, 0xFFFE);
    }

    #[test]
    fn test_short_frames_are_malformed() {
        let table = AddressTable::default();
        for frame in [&[][..], &[27][..], &[27, 1][..]] {
            assert_eq!(
                table.interpret(frame),
                Err(InterpretError::MalformedFrame { len: frame.len() })
            );
        }
    }

    #[test]
    fn test_unknown_address() {
        let table = AddressTable::default();
        assert_eq!(
            table.interpret(&[1, 0, 0]),
            Err(InterpretError::UnknownAddress(1))
        );
    }

    #[test]
    fn test_default_table_layout() {
        let table = AddressTable::default();
        assert_eq!(table.len(), 10 + 2 + 6 + 12 + 7);
        assert_eq!(table.get(0).unwrap().name, "/analog5");
        assert_eq!(table.get(35).unwrap().name, "/button1");
        assert_eq!(table.get(121).unwrap().name, "/cap11");
        assert_eq!(table.get(156).unwrap().name, "/imu/temp");

        let slots: Vec<_> = (99..=104)
            .map(|addr| table.get(addr).unwrap().kind)
            .collect();
        assert_eq!(
            slots,
            [0, 2, 1, 3, 4, 5].map(|index| ChannelKind::Opto { index })
        );
    }

    #[test]
    fn test_from_json() {
        let table = AddressTable::from_json(
            r#"{ "channels": [
                { "address": 5, "name": "/knob" },
                { "address": 6, "name": "/opto", "opto": 3 }
            ] }"#,
        )
        .unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.interpret(&[5, 0, 7]).unwrap().name, "/knob");
        assert_eq!(
            table.get(6).unwrap().kind,
            ChannelKind::Opto { index: 3 }
        );
        assert!(table.interpret(&[27, 0, 0]).is_err());
    }

    #[test]
    fn test_from_json_rejects_duplicates() {
        let err = AddressTable::from_json(
            r#"{ "channels": [
                { "address": 5, "name": "/a" },
                { "address": 5, "name": "/b" }
            ] }"#,
        )
        .unwrap_err();
        assert!(matches!(err, BridgeError::Config(msg) if msg.contains("more than once")));
    }

    #[test]
    fn test_from_json_rejects_bad_entries() {
        assert!(matches!(
            AddressTable::from_json(r#"{ "channels": [{ "address": 5, "name": "a" }] }"#),
            Err(BridgeError::Config(_))
        ));
        assert!(matches!(
            AddressTable::from_json(
                r#"{ "channels": [{ "address": 5, "name": "/o", "opto": 6 }] }"#
            ),
            Err(BridgeError::Config(_))
        ));
        assert!(matches!(
            AddressTable::from_json(r#"{ "channels": [{ "address": 300, "name": "/a" }] }"#),
            Err(BridgeError::Json(_))
        ));
        assert!(matches!(
            AddressTable::from_json(r#"{ "channels": [] }"#),
            Err(BridgeError::Config(_))
        ));
    }

    #[test]
    fn test_from_file_missing() {
        let err = AddressTable::from_file("/nonexistent/sensorbridge-map.json").unwrap_err();
        assert!(matches!(err, BridgeError::ReadConfig { .. }));
    }
}
