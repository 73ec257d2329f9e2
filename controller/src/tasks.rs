//! The four device tasks. They share nothing but [`Device`].

use std::{net::SocketAddr, time::Duration};

use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use fanpilot_common::{
    Actuator, Backoff, Connectivity, ControllerConfig, HttpConfig, PwmDriver, ReadingFilter,
    TemperatureSensor,
};

use crate::{
    api,
    connectivity::{bind_with_backoff, Reachability},
    device::Device,
    scheduler::Task,
};

pub struct SensorTask<S> {
    sensor: S,
    filter: ReadingFilter,
    device: Device,
    period: Duration,
}

impl<S: TemperatureSensor + Send + 'static> SensorTask<S> {
    pub fn new(sensor: S, config: &ControllerConfig, device: Device) -> Self {
        Self {
            sensor,
            filter: ReadingFilter::new(&config.sensor),
            device,
            period: Duration::from_millis(config.tasks.sensor_interval_ms),
        }
    }
}

impl<S: TemperatureSensor + Send + 'static> Task for SensorTask<S> {
    fn name(&self) -> &'static str {
        "sensor"
    }

    fn period(&self) -> Duration {
        self.period
    }

    async fn run_once(&mut self) {
        let sample = self.sensor.sample();
        let previous = self.filter.last();
        match self.filter.accept(sample) {
            Some(celsius) if Some(celsius) != previous => {
                debug!("temperature {celsius:.2} °C");
                self.device.record_temperature(celsius).await;
            }
            Some(_) => {}
            None => debug!("no valid temperature reading yet"),
        }
    }
}

pub struct AutopilotTask {
    device: Device,
    period: Duration,
}

impl AutopilotTask {
    pub fn new(config: &ControllerConfig, device: Device) -> Self {
        Self {
            device,
            period: Duration::from_millis(config.tasks.autopilot_interval_ms),
        }
    }
}

impl Task for AutopilotTask {
    fn name(&self) -> &'static str {
        "autopilot"
    }

    fn period(&self) -> Duration {
        self.period
    }

    async fn setup(&mut self) {
        if !self.device.autopilot_enabled() {
            info!("autopilot disabled by stored state");
        }
    }

    async fn run_once(&mut self) {
        if !self.device.autopilot_enabled() {
            return;
        }
        let Some(celsius) = self.device.temperature_c().await else {
            return;
        };
        // No matching breakpoint keeps whatever duty is already selected.
        let Some(duty) = self.device.decide(celsius).await else {
            return;
        };
        if duty == self.device.pwm().await.current {
            return;
        }

        info!("autopilot selects {duty}% at {celsius:.1} °C");
        if let Err(err) = self.device.set_pwm(duty).await {
            warn!("failed to persist autopilot duty: {err}");
        }
    }
}

pub struct PwmTask<A> {
    driver: PwmDriver<A>,
    device: Device,
    period: Duration,
}

impl<A: Actuator + Send + 'static> PwmTask<A> {
    pub fn new(actuator: A, config: &ControllerConfig, device: Device) -> Self {
        Self {
            driver: PwmDriver::new(actuator),
            device,
            period: Duration::from_millis(config.tasks.pwm_interval_ms),
        }
    }
}

impl<A: Actuator + Send + 'static> Task for PwmTask<A> {
    fn name(&self) -> &'static str {
        "pwm"
    }

    fn period(&self) -> Duration {
        self.period
    }

    async fn run_once(&mut self) {
        let driver = &mut self.driver;
        if self.device.with_pwm(|state| driver.apply(state)).await {
            debug!(signal = ?self.driver.last_signal(), "pwm output driven");
        }
    }
}

/// Brings the network listener up and serves the HTTP surface on it.
pub struct HttpTask {
    config: HttpConfig,
    device: Device,
    reachability: Reachability,
    backoff: Backoff,
    listener: Option<TcpListener>,
}

impl HttpTask {
    pub fn new(config: HttpConfig, device: Device, reachability: Reachability) -> Self {
        let backoff = Backoff::new(
            Duration::from_millis(config.bind_backoff_initial_ms),
            Duration::from_millis(config.bind_backoff_max_ms),
        );
        Self {
            config,
            device,
            reachability,
            backoff,
            listener: None,
        }
    }

    fn addr(&self) -> SocketAddr {
        ([0, 0, 0, 0], self.config.port).into()
    }
}

impl Task for HttpTask {
    fn name(&self) -> &'static str {
        "http"
    }

    fn period(&self) -> Duration {
        Duration::from_millis(self.config.bind_backoff_initial_ms)
    }

    async fn setup(&mut self) {
        let addr = self.addr();
        let listener = bind_with_backoff(addr, &mut self.backoff, &self.reachability).await;
        info!(
            "open http://{}.local:{} to reach the controller",
            self.config.hostname, self.config.port
        );
        self.listener = Some(listener);
    }

    async fn run_once(&mut self) {
        let listener = match self.listener.take() {
            Some(listener) if self.reachability.is_reachable() => listener,
            _ => bind_with_backoff(self.addr(), &mut self.backoff, &self.reachability).await,
        };

        if let Err(err) = axum::serve(listener, api::router(self.device.clone())).await {
            warn!("http server stopped: {err}");
        }
        self.reachability.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use fanpilot_common::{
        Breakpoint, MemoryStorage, PwmSignal, SettingsStore, Storage, StoragePaths,
    };

    use crate::sim::LoggingActuator;

    fn device_on(storage: &MemoryStorage) -> Device {
        Device::boot(SettingsStore::new(
            Arc::new(storage.clone()),
            StoragePaths::default(),
        ))
    }

    struct Scripted(Vec<Option<f32>>);

    impl TemperatureSensor for Scripted {
        fn sample(&mut self) -> Option<f32> {
            if self.0.is_empty() {
                None
            } else {
                self.0.remove(0)
            }
        }
    }

    #[tokio::test]
    async fn autopilot_selects_and_persists_duty() {
        let storage = MemoryStorage::new(4096);
        let device = device_on(&storage);
        device
            .replace_table(&[Breakpoint::new(30, 40), Breakpoint::new(50, 90)])
            .await
            .unwrap();
        let mut task = AutopilotTask::new(&ControllerConfig::default(), device.clone());

        device.record_temperature(35.2).await;
        task.run_once().await;
        assert_eq!(device.pwm().await.current, 90);
        assert_eq!(storage.read("/pwmCurrent").unwrap(), Some(vec![90]));

        // Above every threshold: the previous selection stays.
        device.record_temperature(70.0).await;
        task.run_once().await;
        assert_eq!(device.pwm().await.current, 90);
    }

    #[tokio::test]
    async fn autopilot_waits_for_a_reading() {
        let storage = MemoryStorage::new(4096);
        let device = device_on(&storage);
        device
            .replace_table(&[Breakpoint::new(30, 40)])
            .await
            .unwrap();
        let mut task = AutopilotTask::new(&ControllerConfig::default(), device.clone());

        task.run_once().await;
        assert_eq!(device.pwm().await.current, 0);
    }

    #[tokio::test]
    async fn stored_disabled_flag_stops_autopilot() {
        let storage = MemoryStorage::new(4096);
        storage.write("/autopilotState", &[0]).unwrap();
        let device = device_on(&storage);
        device
            .replace_table(&[Breakpoint::new(30, 40)])
            .await
            .unwrap();
        device.record_temperature(20.0).await;
        let mut task = AutopilotTask::new(&ControllerConfig::default(), device.clone());

        task.run_once().await;
        assert_eq!(device.pwm().await.current, 0);
    }

    #[tokio::test]
    async fn pwm_task_drives_current_value() {
        let storage = MemoryStorage::new(4096);
        let device = device_on(&storage);
        let actuator = LoggingActuator::default();
        let mut task = PwmTask::new(actuator.clone(), &ControllerConfig::default(), device.clone());

        device.set_pwm(50).await.unwrap();
        task.run_once().await;

        assert_eq!(actuator.last(), Some(PwmSignal::Duty(128)));
        assert_eq!(device.pwm().await.previous, 50);

        device.set_pwm(95).await.unwrap();
        task.run_once().await;
        assert_eq!(actuator.last(), Some(PwmSignal::FullOn));
    }

    #[tokio::test]
    async fn sensor_task_keeps_last_good_reading() {
        let storage = MemoryStorage::new(4096);
        let device = device_on(&storage);
        let mut task = SensorTask::new(
            Scripted(vec![Some(22.0), None, Some(-127.0), Some(150.0), Some(23.5)]),
            &ControllerConfig::default(),
            device.clone(),
        );

        task.run_once().await;
        assert_eq!(device.temperature_c().await, Some(22.0));

        for _ in 0..3 {
            task.run_once().await;
            assert_eq!(device.temperature_c().await, Some(22.0));
        }

        task.run_once().await;
        assert_eq!(device.temperature_c().await, Some(23.5));
    }
}
