use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TaskConfig {
    pub sensor_interval_ms: u64,
    pub autopilot_interval_ms: u64,
    pub pwm_interval_ms: u64,
    /// Upper bound for any task's wait between iterations.
    pub max_task_wait_ms: u64,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            sensor_interval_ms: 3_000,
            autopilot_interval_ms: 5_000,
            pwm_interval_ms: 1_000,
            max_task_wait_ms: 5_000,
        }
    }
}

impl TaskConfig {
    pub fn sanitize(&mut self) {
        self.max_task_wait_ms = self.max_task_wait_ms.clamp(10, 30_000);
        let max_wait = self.max_task_wait_ms;
        for interval in [
            &mut self.sensor_interval_ms,
            &mut self.autopilot_interval_ms,
            &mut self.pwm_interval_ms,
        ] {
            *interval = (*interval).clamp(1, max_wait);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SensorConfig {
    /// Exclusive bounds of an accepted reading, °C.
    pub min_valid_c: f32,
    pub max_valid_c: f32,
    /// Parameters of the simulated sensor on host builds.
    pub simulated_base_c: f32,
    pub simulated_swing_c: f32,
    pub simulated_period_ticks: u32,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            min_valid_c: 0.0,
            max_valid_c: 100.0,
            simulated_base_c: 35.0,
            simulated_swing_c: 15.0,
            simulated_period_ticks: 40,
        }
    }
}

impl SensorConfig {
    pub fn sanitize(&mut self) {
        if !self.min_valid_c.is_finite() || !self.max_valid_c.is_finite() {
            let defaults = Self::default();
            self.min_valid_c = defaults.min_valid_c;
            self.max_valid_c = defaults.max_valid_c;
        }
        if self.min_valid_c >= self.max_valid_c {
            std::mem::swap(&mut self.min_valid_c, &mut self.max_valid_c);
        }
        self.simulated_period_ticks = self.simulated_period_ticks.max(2);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HttpConfig {
    pub port: u16,
    pub hostname: String,
    pub bind_backoff_initial_ms: u64,
    pub bind_backoff_max_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            hostname: "kirby".to_string(),
            bind_backoff_initial_ms: 500,
            bind_backoff_max_ms: 30_000,
        }
    }
}

impl HttpConfig {
    pub fn sanitize(&mut self) {
        self.bind_backoff_initial_ms = self.bind_backoff_initial_ms.clamp(10, 10_000);
        self.bind_backoff_max_ms = self
            .bind_backoff_max_ms
            .clamp(self.bind_backoff_initial_ms, 300_000);
        if self.hostname.trim().is_empty() {
            self.hostname = Self::default().hostname;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoragePaths {
    pub pwm_current_location: String,
    pub autopilot_settings_location: String,
    pub autopilot_state_location: String,
}

impl Default for StoragePaths {
    fn default() -> Self {
        Self {
            pwm_current_location: "/pwmCurrent".to_string(),
            autopilot_settings_location: "/autopilotSettings.csv".to_string(),
            autopilot_state_location: "/autopilotState".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ControllerConfig {
    pub tasks: TaskConfig,
    pub sensor: SensorConfig,
    pub http: HttpConfig,
    pub storage: StoragePaths,
    pub storage_capacity_bytes: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            tasks: TaskConfig::default(),
            sensor: SensorConfig::default(),
            http: HttpConfig::default(),
            storage: StoragePaths::default(),
            storage_capacity_bytes: 2 * 1024 * 1024,
        }
    }
}

impl ControllerConfig {
    pub fn sanitize(&mut self) {
        self.tasks.sanitize();
        self.sensor.sanitize();
        self.http.sanitize();
        self.storage_capacity_bytes = self.storage_capacity_bytes.max(4096);
    }
}
