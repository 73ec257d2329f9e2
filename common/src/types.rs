use std::fmt::Write;

use serde::Serialize;

use crate::{
    autopilot::AutopilotTable,
    pwm::PwmState,
    storage::{DirEntry, EntryKind, Storage},
};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StorageStatus {
    #[serde(rename = "type")]
    pub backend: &'static str,
    #[serde(rename = "isOk")]
    pub is_ok: bool,
    #[serde(rename = "totalBytes", skip_serializing_if = "Option::is_none")]
    pub total_bytes: Option<u64>,
    #[serde(rename = "usedBytes", skip_serializing_if = "Option::is_none")]
    pub used_bytes: Option<u64>,
    #[serde(rename = "unsupportedFiles")]
    pub unsupported_files: Vec<String>,
}

impl StorageStatus {
    pub fn from_storage(storage: &dyn Storage) -> Self {
        let info = storage.info();
        Self {
            backend: storage.name(),
            is_ok: info.is_some(),
            total_bytes: info.map(|info| info.total_bytes),
            used_bytes: info.map(|info| info.used_bytes),
            unsupported_files: storage.unsupported_files(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ListEntry {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl From<&DirEntry> for ListEntry {
    fn from(entry: &DirEntry) -> Self {
        let name = entry.name.trim_start_matches('/').to_string();
        match entry.kind {
            EntryKind::Dir => Self {
                kind: "dir",
                name,
                size: None,
            },
            EntryKind::File { size } => Self {
                kind: "file",
                name,
                size: Some(size),
            },
        }
    }
}

/// Snapshot rendered by `/metrics`, one `name value` pair per line.
#[derive(Debug, Clone)]
pub struct Metrics {
    pub temperature_c: Option<f32>,
    pub pwm: PwmState,
    pub autopilot_enabled: bool,
    pub table: AutopilotTable,
}

impl Metrics {
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(128 + self.table.len() * 48);
        match self.temperature_c {
            Some(celsius) => {
                let _ = writeln!(out, "temperature_celsius {celsius:.2}");
            }
            None => out.push_str("temperature_celsius NaN\n"),
        }
        let _ = writeln!(out, "pwm_previous_percent {}", self.pwm.previous);
        let _ = writeln!(out, "pwm_current_percent {}", self.pwm.current);
        let _ = writeln!(out, "autopilot_enabled {}", u8::from(self.autopilot_enabled));
        for entry in self.table.entries() {
            let _ = writeln!(
                out,
                "autopilot_breakpoint{{temperature=\"{}\"}} {}",
                entry.threshold_c, entry.duty_percent
            );
        }
        out
    }
}
