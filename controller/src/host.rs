use std::{io::ErrorKind, path::Path, path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use tracing::{info, warn};

use fanpilot_common::{ControllerConfig, SettingsStore, Storage};

use crate::{
    connectivity::Reachability,
    device::Device,
    scheduler::Scheduler,
    sim::{LoggingActuator, SimulatedSensor},
    store::FsStorage,
    tasks::{AutopilotTask, HttpTask, PwmTask, SensorTask},
};

const CONFIG_FILE: &str = "controller.json";

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let data_dir = std::env::var("FANPILOT_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./.fanpilot"));

    let mut config = load_config(&data_dir).unwrap_or_else(|err| {
        warn!("failed to load controller config: {err:#}");
        ControllerConfig::default()
    });
    if let Some(port) = std::env::var("FANPILOT_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
    {
        config.http.port = port;
    }
    config.sanitize();

    let storage = FsStorage::open(&data_dir, config.storage_capacity_bytes);
    if storage.is_available() {
        info!("storage initialized at {}", data_dir.display());
    } else {
        warn!("storage init failed, serving with defaults");
    }
    let settings = SettingsStore::new(Arc::new(storage), config.storage.clone());
    let device = Device::boot(settings);

    let mut scheduler = Scheduler::new(Duration::from_millis(config.tasks.max_task_wait_ms));
    scheduler.spawn(HttpTask::new(
        config.http.clone(),
        device.clone(),
        Reachability::default(),
    ));
    scheduler.spawn(SensorTask::new(
        SimulatedSensor::new(&config.sensor),
        &config,
        device.clone(),
    ));
    scheduler.spawn(AutopilotTask::new(&config, device.clone()));
    scheduler.spawn(PwmTask::new(LoggingActuator::default(), &config, device));

    info!("controller {} started", config.http.hostname);
    scheduler.run().await
}

fn load_config(data_dir: &Path) -> anyhow::Result<ControllerConfig> {
    let path = data_dir.join(CONFIG_FILE);
    match std::fs::read(&path) {
        Ok(raw) => serde_json::from_slice(&raw)
            .with_context(|| format!("invalid config in {}", path.display())),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(ControllerConfig::default()),
        Err(err) => Err(err).with_context(|| format!("failed to read {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_file_uses_defaults() {
        let dir = std::env::temp_dir().join(format!("fanpilot-config-{}", std::process::id()));
        let config = load_config(&dir).unwrap();
        assert_eq!(config, ControllerConfig::default());
    }

    #[test]
    fn invalid_config_is_reported() {
        let dir = std::env::temp_dir().join(format!("fanpilot-badcfg-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(CONFIG_FILE), b"{not json").unwrap();

        assert!(load_config(&dir).is_err());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
