//! Synthetic Time Card telemetry.
//!
//! **Test double.** This source fabricates plausible readings from a seeded
//! RNG so demos and tests can run without hardware. It is only compiled with
//! the `simulation` feature and is never chosen unless asked for explicitly.

use std::collections::HashMap;

use async_trait::async_trait;
use ocpwatch_types::Reading;
use parking_lot::Mutex;
use rand::prelude::*;
use rand::rngs::StdRng;

use crate::DataSource;

/// Simulation knobs.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Random seed for reproducibility.
    pub seed: u64,
    /// Probability that any single read comes back unavailable.
    pub dropout_rate: f64,
    /// Probability that a numeric read is a wild spike.
    pub spike_rate: f64,
    /// GNSS state reported while not dropped out.
    pub gnss_state: String,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            dropout_rate: 0.01,
            spike_rate: 0.02,
            gnss_state: "SYNC".to_string(),
        }
    }
}

impl SimulationConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_dropout_rate(mut self, rate: f64) -> Self {
        self.dropout_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn with_spike_rate(mut self, rate: f64) -> Self {
        self.spike_rate = rate.clamp(0.0, 1.0);
        self
    }
}

/// Nominal value and jitter for a numeric channel.
fn nominal(channel: &str) -> Option<(f64, f64)> {
    let profile = match channel {
        "clock_offset_ns" => (0.0, 40.0),
        "clock_drift_ppb" => (0.0, 5.0),
        "path_delay_ns" => (2500.0, 60.0),
        "gnss_satellites" => (11.0, 2.0),
        "gnss_signal_db" => (42.0, 1.5),
        "fpga_temp_c" => (52.0, 0.5),
        "osc_temp_c" => (45.0, 0.3),
        "board_temp_c" => (38.0, 0.4),
        "ambient_temp_c" => (27.0, 0.2),
        "voltage_3v3" => (3.30, 0.02),
        "voltage_1v8" => (1.80, 0.01),
        "voltage_5v" => (5.00, 0.03),
        "voltage_12v" => (12.05, 0.05),
        "current_total_ma" => (1450.0, 40.0),
        _ => return None,
    };
    Some(profile)
}

fn state(channel: &str, config: &SimulationConfig) -> Option<String> {
    let value = match channel {
        "gnss_sync" => config.gnss_state.as_str(),
        "clock_source" => "GNSS",
        "sma1" => "10MHz",
        "sma2" => "PPS",
        "sma3" | "sma4" => "disable",
        _ => return None,
    };
    Some(value.to_string())
}

/// Seeded synthetic telemetry for every channel in the Time Card catalog.
#[derive(Debug)]
pub struct SimulatedSource {
    config: SimulationConfig,
    rngs: Mutex<HashMap<String, StdRng>>,
    description: String,
}

impl SimulatedSource {
    pub fn new(config: SimulationConfig) -> Self {
        let description = format!("simulated (seed {})", config.seed);
        Self {
            config,
            rngs: Mutex::new(HashMap::new()),
            description,
        }
    }

    /// Each device gets its own stream so devices do not perturb each other.
    fn device_seed(&self, device: &str) -> u64 {
        device
            .bytes()
            .fold(self.config.seed, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64))
    }
}

impl Default for SimulatedSource {
    fn default() -> Self {
        Self::new(SimulationConfig::default())
    }
}

#[async_trait]
impl DataSource for SimulatedSource {
    async fn read(&self, device: &str, channel: &str) -> Reading {
        let seed = self.device_seed(device);
        let mut rngs = self.rngs.lock();
        let rng = rngs
            .entry(device.to_string())
            .or_insert_with(|| StdRng::seed_from_u64(seed));

        if rng.gen_bool(self.config.dropout_rate) {
            return Reading::unavailable("simulated dropout");
        }

        if let Some(text) = state(channel, &self.config) {
            return Reading::text(text);
        }

        match nominal(channel) {
            Some((center, jitter)) => {
                let mut value = center + rng.gen_range(-jitter..=jitter);
                if rng.gen_bool(self.config.spike_rate) {
                    value += jitter * rng.gen_range(20.0..50.0);
                }
                if channel == "gnss_satellites" {
                    value = value.round().max(0.0);
                }
                Reading::number(value)
            }
            None => Reading::unavailable(format!("no simulation profile for {}", channel)),
        }
    }

    fn describe(&self) -> &str {
        &self.description
    }
}
