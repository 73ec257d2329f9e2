//! Loads and stores device state through the codec. Reads never fail boot:
//! problems are logged and defaults are used instead.

use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    autopilot::{AutopilotTable, MAX_DUTY_PERCENT},
    codec,
    config::StoragePaths,
    error::PersistError,
    storage::Storage,
};

#[derive(Clone)]
pub struct SettingsStore {
    storage: Arc<dyn Storage>,
    paths: StoragePaths,
}

impl SettingsStore {
    pub fn new(storage: Arc<dyn Storage>, paths: StoragePaths) -> Self {
        Self { storage, paths }
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn load_pwm(&self) -> Option<u8> {
        let bytes = self.read_existing(&self.paths.pwm_current_location)?;
        match codec::decode_scalar(&bytes, MAX_DUTY_PERCENT) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(
                    "ignoring stored pwm value in {}: {err}",
                    self.paths.pwm_current_location
                );
                None
            }
        }
    }

    pub fn save_pwm(&self, duty_percent: u8) -> Result<(), PersistError> {
        self.write(
            &self.paths.pwm_current_location,
            &codec::encode_scalar(duty_percent),
        )
    }

    /// Restores the table; absent or unreadable files yield an empty table.
    pub fn load_table(&self) -> AutopilotTable {
        let mut table = AutopilotTable::default();
        if let Some(bytes) = self.read_existing(&self.paths.autopilot_settings_location) {
            let text = String::from_utf8_lossy(&bytes);
            let restored = codec::decode_table(&text, &mut table);
            info!("restored {restored} autopilot breakpoints");
        }
        table
    }

    /// Rewrites the stored table from scratch. The previous file stays intact
    /// if the write fails.
    pub fn save_table(&self, table: &AutopilotTable) -> Result<(), PersistError> {
        self.write(
            &self.paths.autopilot_settings_location,
            codec::encode_table(table).as_bytes(),
        )
    }

    /// Autopilot on/off flag. Nothing on the device writes it yet.
    pub fn load_autopilot_enabled(&self) -> Option<bool> {
        let bytes = self.read_existing(&self.paths.autopilot_state_location)?;
        match codec::decode_flag(&bytes) {
            Ok(enabled) => Some(enabled),
            Err(err) => {
                warn!(
                    "ignoring stored autopilot state in {}: {err}",
                    self.paths.autopilot_state_location
                );
                None
            }
        }
    }

    fn read_existing(&self, path: &str) -> Option<Vec<u8>> {
        match self.storage.read(path) {
            Ok(Some(bytes)) => Some(bytes),
            Ok(None) => {
                warn!("{path} not found in storage, using defaults");
                None
            }
            Err(err) => {
                warn!("failed to open {path}: {err}");
                None
            }
        }
    }

    fn write(&self, path: &str, bytes: &[u8]) -> Result<(), PersistError> {
        if !self.storage.is_available() {
            return Err(PersistError::Unavailable);
        }
        self.storage
            .write(path, bytes)
            .map_err(|source| PersistError::Write {
                path: path.to_string(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{autopilot::Breakpoint, storage::MemoryStorage};
    use pretty_assertions::assert_eq;

    fn store() -> (MemoryStorage, SettingsStore) {
        let storage = MemoryStorage::new(64 * 1024);
        let store = SettingsStore::new(Arc::new(storage.clone()), StoragePaths::default());
        (storage, store)
    }

    #[test]
    fn missing_files_yield_defaults() {
        let (_, store) = store();

        assert_eq!(store.load_pwm(), None);
        assert!(store.load_table().is_empty());
        assert_eq!(store.load_autopilot_enabled(), None);
    }

    #[test]
    fn pwm_and_table_persist() {
        let (_, store) = store();
        let table =
            AutopilotTable::from_entries(&[Breakpoint::new(30, 50), Breakpoint::new(40, 100)])
                .unwrap();

        store.save_pwm(75).unwrap();
        store.save_table(&table).unwrap();

        assert_eq!(store.load_pwm(), Some(75));
        assert_eq!(store.load_table(), table);
    }

    #[test]
    fn saving_a_shorter_table_drops_old_rows() {
        let (storage, store) = store();
        let long = AutopilotTable::from_entries(&[
            Breakpoint::new(20, 10),
            Breakpoint::new(30, 20),
            Breakpoint::new(40, 30),
        ])
        .unwrap();
        let short = AutopilotTable::from_entries(&[Breakpoint::new(25, 60)]).unwrap();

        store.save_table(&long).unwrap();
        store.save_table(&short).unwrap();

        assert_eq!(store.load_table(), short);
        assert_eq!(
            storage.read("/autopilotSettings.csv").unwrap(),
            Some(b"temperature,strength\n25,60 \n".to_vec())
        );
    }

    #[test]
    fn failed_table_write_keeps_the_stored_table() {
        let (storage, store) = store();
        let stored = AutopilotTable::from_entries(&[Breakpoint::new(30, 50)]).unwrap();
        let rejected = AutopilotTable::from_entries(&[Breakpoint::new(40, 90)]).unwrap();
        store.save_table(&stored).unwrap();

        storage.set_fail_writes(true);
        assert!(store.save_table(&rejected).is_err());
        storage.set_fail_writes(false);

        assert_eq!(store.load_table(), stored);
    }

    #[test]
    fn unavailable_storage_refuses_writes() {
        let (storage, store) = store();
        storage.set_available(false);

        assert!(matches!(store.save_pwm(10), Err(PersistError::Unavailable)));
        assert_eq!(store.load_pwm(), None);
    }

    #[test]
    fn multi_byte_pwm_file_is_rejected() {
        let (storage, store) = store();
        storage.write("/pwmCurrent", &[10, 75]).unwrap();

        assert_eq!(store.load_pwm(), None);
    }

    #[test]
    fn autopilot_flag_is_read() {
        let (storage, store) = store();
        storage.write("/autopilotState", &[0]).unwrap();

        assert_eq!(store.load_autopilot_enabled(), Some(false));
    }

    #[test]
    fn failed_write_is_reported() {
        let (storage, store) = store();
        storage.set_fail_writes(true);

        assert!(matches!(
            store.save_pwm(10),
            Err(PersistError::Write { .. })
        ));
    }
}
