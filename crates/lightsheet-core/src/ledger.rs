//! Record of acquisitions that have already been submitted.
//!
//! Read once when a run starts to prune discovery, written once when it
//! ends. A crash in between leaves the file untouched, so jobs submitted
//! before the crash are submitted again on the next run.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::PipelineConfig;
use crate::error::{LightsheetError, Result};
use crate::planner::Plan;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeconFirstRecord {
    pub deskew: Map<String, Value>,
    pub decon: Map<String, Value>,
}

/// Parameters actually applied to one acquisition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProcessedRecord {
    pub time: NaiveDateTime,
    pub parsing: Map<String, Value>,
    pub bdv_parsing: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crop: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flatfield: Option<Map<String, Value>>,
    #[serde(
        rename = "decon-first",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub decon_first: Option<DeconFirstRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deskew: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decon: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mip: Option<Map<String, Value>>,
}

impl ProcessedRecord {
    /// Stage parameters from the configuration, plus the raw scan steps of
    /// this acquisition under `deskew.step`.
    pub fn from_plan(config: &PipelineConfig, plan: &Plan, time: NaiveDateTime) -> Self {
        let deskew = config.deskew.as_ref().map(|d| {
            let mut record = d.to_record();
            record.insert(
                "step".into(),
                Value::Array(plan.scan_steps.iter().map(|&s| Value::from(s)).collect()),
            );
            record
        });
        Self {
            time,
            parsing: plan.channels.parsing_record(),
            bdv_parsing: plan.channels.bdv_record(),
            crop: config.crop.as_ref().map(|c| c.to_record()),
            flatfield: config.flatfield.as_ref().map(|c| c.to_record()),
            decon_first: config.decon_first.as_ref().map(|d| DeconFirstRecord {
                deskew: d.deskew.to_record(),
                decon: d.decon.to_record(),
            }),
            deskew,
            decon: config.decon.as_ref().map(|c| c.to_record()),
            mip: config.projection.as_ref().map(|c| c.to_record()),
        }
    }

    pub fn now(config: &PipelineConfig, plan: &Plan) -> Self {
        Self::from_plan(config, plan, Local::now().naive_local())
    }
}

/// `processed.json`: acquisition path to record. Entries written by older
/// runs are kept verbatim.
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    entries: BTreeMap<String, Value>,
}

impl Ledger {
    /// Load the ledger, or start an empty one when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        let entries = if path.is_file() {
            let text = std::fs::read_to_string(path)?;
            serde_json::from_str(&text).map_err(|e| {
                LightsheetError::Config(format!(
                    "'{}' is not formatted as a proper JSON file: {e}",
                    path.display()
                ))
            })?
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, acquisition: &Path) -> bool {
        self.entries.contains_key(&acquisition.to_string_lossy().into_owned())
    }

    /// Paths discovery must not descend into.
    pub fn excludes(&self) -> BTreeSet<PathBuf> {
        self.entries.keys().map(PathBuf::from).collect()
    }

    /// Add or replace records. Later records for the same path win.
    pub fn merge<I>(&mut self, records: I) -> Result<()>
    where
        I: IntoIterator<Item = (PathBuf, ProcessedRecord)>,
    {
        for (path, record) in records {
            let key = path.to_string_lossy().into_owned();
            debug!(acquisition = %key, "ledger entry");
            self.entries.insert(key, serde_json::to_value(record)?);
        }
        Ok(())
    }

    /// The ledger as four-space indented JSON.
    pub fn to_pretty_string(&self) -> Result<String> {
        let mut buf = Vec::new();
        let formatter = PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.entries.serialize(&mut ser)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    pub fn persist(&self) -> Result<()> {
        std::fs::write(&self.path, self.to_pretty_string()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> ProcessedRecord {
        ProcessedRecord {
            time: NaiveDateTime::default(),
            parsing: Map::new(),
            bdv_parsing: Map::new(),
            crop: None,
            flatfield: None,
            decon_first: None,
            deskew: Some(json!({"step": [0.4]}).as_object().cloned().unwrap()),
            decon: None,
            mip: None,
        }
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::load(&dir.path().join("processed.json")).unwrap();
        assert!(ledger.is_empty());
    }

    #[test]
    fn malformed_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(Ledger::load(&path).unwrap_err().is_fatal_for_run());
    }

    #[test]
    fn merge_persist_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed.json");
        let mut ledger = Ledger::load(&path).unwrap();
        ledger
            .merge([(PathBuf::from("/data/a"), record())])
            .unwrap();
        ledger.persist().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\n    \"/data/a\": {"), "got:\n{text}");
        assert!(!text.contains("\"crop\""));

        let reloaded = Ledger::load(&path).unwrap();
        assert!(reloaded.contains(Path::new("/data/a")));
        assert!(reloaded.excludes().contains(Path::new("/data/a")));
    }

    #[test]
    fn older_entries_survive_merge() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed.json");
        std::fs::write(&path, r#"{"/data/old": {"time": "legacy"}}"#).unwrap();
        let mut ledger = Ledger::load(&path).unwrap();
        ledger.merge([(PathBuf::from("/data/new"), record())]).unwrap();
        assert_eq!(ledger.len(), 2);
        assert!(ledger.contains(Path::new("/data/old")));
    }
}
