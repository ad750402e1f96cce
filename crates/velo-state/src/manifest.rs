//! State manifest serialization
//!
//! The manifest is a self-describing, versioned JSON object. Loading is
//! strict about the outer shape but lenient per record: a malformed target
//! record is skipped with a warning instead of aborting the whole load, so
//! one bad entry costs one rebuild rather than a full one. Unknown fields
//! are ignored for forward compatibility.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::record::{ArtifactRecord, ToolchainIdentity};

/// Current manifest schema version
pub const MANIFEST_VERSION: &str = "1";

#[derive(Debug, Serialize, Deserialize)]
struct ManifestFile {
    version: String,
    #[serde(default)]
    toolchain: ToolchainIdentity,
    #[serde(default)]
    targets: BTreeMap<String, Value>,
}

/// Serialize records and toolchain identity to manifest text
pub fn serialize(
    toolchain: &ToolchainIdentity,
    records: &BTreeMap<String, ArtifactRecord>,
) -> String {
    let targets = records
        .iter()
        .map(|(name, record)| {
            let value = serde_json::to_value(record).unwrap_or(Value::Null);
            (name.clone(), value)
        })
        .collect();

    let file = ManifestFile {
        version: MANIFEST_VERSION.to_string(),
        toolchain: toolchain.clone(),
        targets,
    };

    // BTreeMap keys keep the output stable across runs
    serde_json::to_string_pretty(&file).expect("manifest serialization cannot fail")
}

/// Deserialize manifest text into toolchain identity and records.
/// Individual records that fail to parse or fail validity are dropped.
pub fn deserialize(
    text: &str,
) -> Result<(ToolchainIdentity, BTreeMap<String, ArtifactRecord>), serde_json::Error> {
    let file: ManifestFile = serde_json::from_str(text)?;

    if file.version != MANIFEST_VERSION {
        warn!(
            found = %file.version,
            expected = MANIFEST_VERSION,
            "state manifest version differs; reading best-effort"
        );
    }

    let mut records = BTreeMap::new();
    for (name, value) in file.targets {
        match serde_json::from_value::<ArtifactRecord>(value) {
            Ok(record) if record.is_valid() => {
                records.insert(name, record);
            }
            Ok(_) => {
                warn!(target = %name, "skipping incomplete state record");
            }
            Err(error) => {
                warn!(target = %name, %error, "skipping malformed state record");
            }
        }
    }

    Ok((file.toolchain, records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::DependencyInfo;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn sample_record(name: &str) -> ArtifactRecord {
        ArtifactRecord {
            target_name: name.to_string(),
            output_path: PathBuf::from(format!("/out/{name}")),
            source_hash: "sha256:abcd".to_string(),
            command_hash: 1234,
            direct_dependencies: vec![DependencyInfo::new("/out/libdep.a", "sha256:ef01")],
            implicit_dependencies: vec![PathBuf::from("assets/logo.bin")],
            source_timestamp: 100,
            build_timestamp: 200,
            build_duration_ms: 40,
        }
    }

    #[test]
    fn test_round_trip() {
        let toolchain = ToolchainIdentity::new("0.4.0", "sha256:cc");
        let mut records = BTreeMap::new();
        records.insert("app".to_string(), sample_record("app"));
        records.insert("lib".to_string(), sample_record("lib"));

        let text = serialize(&toolchain, &records);
        let (loaded_toolchain, loaded_records) = deserialize(&text).unwrap();

        assert_eq!(loaded_toolchain, toolchain);
        assert_eq!(loaded_records, records);
    }

    #[test]
    fn test_version_field_present() {
        let text = serialize(&ToolchainIdentity::default(), &BTreeMap::new());
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["version"], MANIFEST_VERSION);
    }

    #[test]
    fn test_malformed_record_is_skipped() {
        let text = r#"{
            "version": "1",
            "toolchain": { "compiler_version": "0.4.0" },
            "targets": {
                "good": {
                    "target_name": "good",
                    "output_path": "/out/good",
                    "source_hash": "sha256:aa",
                    "command_hash": 1
                },
                "bad": { "command_hash": "not a number" }
            }
        }"#;

        let (_, records) = deserialize(text).unwrap();
        assert_eq!(records.len(), 1);
        assert!(records.contains_key("good"));
    }

    #[test]
    fn test_invalid_record_is_skipped() {
        // parses, but carries no source hash, so it cannot prove anything
        let text = r#"{
            "version": "1",
            "targets": {
                "empty": { "target_name": "empty", "output_path": "/out/e", "source_hash": "", "command_hash": 0 }
            }
        }"#;
        let (_, records) = deserialize(text).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let text = r#"{
            "version": "1",
            "toolchain": { "compiler_version": "0.4.0", "future_field": true },
            "targets": {},
            "trailer": "ignored"
        }"#;
        let (toolchain, records) = deserialize(text).unwrap();
        assert_eq!(toolchain.compiler_version, "0.4.0");
        assert!(records.is_empty());
    }

    #[test]
    fn test_missing_optional_fields_default() {
        let text = r#"{
            "version": "1",
            "targets": {
                "a": {
                    "target_name": "a",
                    "output_path": "/out/a",
                    "source_hash": "sha256:aa",
                    "command_hash": 7
                }
            }
        }"#;
        let (_, records) = deserialize(text).unwrap();
        let record = &records["a"];
        assert_eq!(record.build_timestamp, 0);
        assert!(record.direct_dependencies.is_empty());
        assert!(record.implicit_dependencies.is_empty());
    }

    #[test]
    fn test_garbage_input_is_error() {
        assert!(deserialize("not json").is_err());
        assert!(deserialize("[1, 2, 3]").is_err());
    }
}
