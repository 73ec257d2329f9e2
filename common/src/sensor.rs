use crate::config::SensorConfig;

/// Value a disconnected one-wire probe reports.
pub const DISCONNECTED_C: f32 = -127.0;

pub trait TemperatureSensor {
    fn sample(&mut self) -> Option<f32>;
}

/// Keeps the last accepted reading; rejected samples never replace it.
#[derive(Debug, Clone)]
pub struct ReadingFilter {
    min_valid_c: f32,
    max_valid_c: f32,
    last: Option<f32>,
}

impl ReadingFilter {
    pub fn new(config: &SensorConfig) -> Self {
        Self {
            min_valid_c: config.min_valid_c,
            max_valid_c: config.max_valid_c,
            last: None,
        }
    }

    pub fn is_valid(&self, celsius: f32) -> bool {
        celsius.is_finite()
            && celsius != DISCONNECTED_C
            && celsius > self.min_valid_c
            && celsius < self.max_valid_c
    }

    /// Returns the reading in effect after `sample` was considered.
    pub fn accept(&mut self, sample: Option<f32>) -> Option<f32> {
        if let Some(celsius) = sample.filter(|celsius| self.is_valid(*celsius)) {
            self.last = Some(celsius);
        }
        self.last
    }

    pub fn last(&self) -> Option<f32> {
        self.last
    }
}
