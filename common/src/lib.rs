pub mod autopilot;
pub mod codec;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod persist;
pub mod pwm;
pub mod sensor;
pub mod storage;
pub mod types;

pub use autopilot::{AutopilotTable, Breakpoint, N_MAX};
pub use config::{ControllerConfig, HttpConfig, SensorConfig, StoragePaths, TaskConfig};
pub use connectivity::{Backoff, Connectivity};
pub use error::{CodecError, PersistError, TableError};
pub use persist::SettingsStore;
pub use pwm::{Actuator, PwmDriver, PwmSignal, PwmState};
pub use sensor::{ReadingFilter, TemperatureSensor};
pub use storage::{DirEntry, EntryKind, MemoryStorage, Storage, StorageInfo};
pub use types::{ListEntry, Metrics, StorageStatus};
