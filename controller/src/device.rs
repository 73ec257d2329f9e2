//! State shared between the tasks and the HTTP surface.
//!
//! Every mutation goes through a lock held for the whole update, so a reader
//! never sees a half-replaced table or a PWM value that was set but not yet
//! persisted. Storage writes run on tokio's blocking pool, off the scheduler
//! thread.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use fanpilot_common::{
    AutopilotTable, Breakpoint, Metrics, PersistError, PwmState, SettingsStore, TableError,
};

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error(transparent)]
    Invalid(#[from] TableError),
    #[error(transparent)]
    Persist(#[from] PersistError),
}

#[derive(Clone)]
pub struct Device {
    table: Arc<RwLock<AutopilotTable>>,
    pwm: Arc<Mutex<PwmState>>,
    temperature_c: Arc<Mutex<Option<f32>>>,
    autopilot_enabled: Arc<AtomicBool>,
    settings: SettingsStore,
}

impl Device {
    /// Restores persisted state. Missing or unreadable data falls back to
    /// defaults so the device always comes up.
    pub fn boot(settings: SettingsStore) -> Self {
        let pwm = settings.load_pwm().unwrap_or(0);
        let table = settings.load_table();
        let autopilot_enabled = settings.load_autopilot_enabled().unwrap_or(true);

        info!(
            pwm,
            breakpoints = table.len(),
            autopilot_enabled,
            "device state restored"
        );

        Self {
            table: Arc::new(RwLock::new(table)),
            pwm: Arc::new(Mutex::new(PwmState::new(pwm))),
            temperature_c: Arc::new(Mutex::new(None)),
            autopilot_enabled: Arc::new(AtomicBool::new(autopilot_enabled)),
            settings,
        }
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn autopilot_enabled(&self) -> bool {
        self.autopilot_enabled.load(Ordering::Relaxed)
    }

    pub async fn temperature_c(&self) -> Option<f32> {
        *self.temperature_c.lock().await
    }

    pub async fn record_temperature(&self, celsius: f32) {
        *self.temperature_c.lock().await = Some(celsius);
    }

    pub async fn pwm(&self) -> PwmState {
        *self.pwm.lock().await
    }

    /// Single entry point for operator and autopilot duty changes: sets the
    /// target and persists it while holding the PWM lock.
    pub async fn set_pwm(&self, duty_percent: u8) -> Result<u8, PersistError> {
        let mut pwm = self.pwm.lock().await;
        pwm.set_current(duty_percent);
        let current = pwm.current;
        self.persist(move |settings| settings.save_pwm(current)).await?;
        Ok(current)
    }

    /// Runs `apply` against the PWM state under its lock.
    pub async fn with_pwm<R>(&self, apply: impl FnOnce(&mut PwmState) -> R) -> R {
        let mut pwm = self.pwm.lock().await;
        apply(&mut pwm)
    }

    pub async fn table(&self) -> AutopilotTable {
        self.table.read().await.clone()
    }

    /// Duty the table selects for `temperature_c`, if any breakpoint applies.
    pub async fn decide(&self, temperature_c: f32) -> Option<u8> {
        self.table.read().await.duty_for(temperature_c)
    }

    /// Validates `entries`, swaps them in, and rewrites the stored table.
    /// Invalid input changes nothing; a failed write leaves the new table in
    /// memory and the old one on storage until the next successful save.
    pub async fn replace_table(&self, entries: &[Breakpoint]) -> Result<AutopilotTable, UpdateError> {
        let mut table = self.table.write().await;
        table.replace(entries)?;

        let snapshot = table.clone();
        if let Err(err) = self
            .persist(move |settings| settings.save_table(&snapshot))
            .await
        {
            warn!("autopilot table updated in memory but not persisted: {err}");
            return Err(err.into());
        }
        info!(breakpoints = table.len(), "autopilot table replaced");
        Ok(table.clone())
    }

    async fn persist<F>(&self, work: F) -> Result<(), PersistError>
    where
        F: FnOnce(&SettingsStore) -> Result<(), PersistError> + Send + 'static,
    {
        let settings = self.settings.clone();
        tokio::task::spawn_blocking(move || work(&settings))
            .await
            .map_err(|err| PersistError::Interrupted(err.to_string()))?
    }

    pub async fn metrics(&self) -> Metrics {
        Metrics {
            temperature_c: self.temperature_c().await,
            pwm: self.pwm().await,
            autopilot_enabled: self.autopilot_enabled(),
            table: self.table().await,
        }
    }
}
