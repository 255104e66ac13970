//! Simulated receiver hardware for host runs

use anyhow::Result;
use rand::Rng;
use tracing::{debug, info};

use super::{duty_for_angle, ActuatorPort, ForceChannel, ServoId, ADC_MAX};

/// Force sensors that mostly rest near zero with occasional load, logging
/// every servo and indicator command
pub struct SimulatedActuators {
    /// Probability that a sensor reports a load on a given read
    load_probability: f64,
    angles: [u8; 3],
    indicator: bool,
}

impl SimulatedActuators {
    pub fn new(load_probability: f64) -> Self {
        Self {
            load_probability: load_probability.clamp(0.0, 1.0),
            angles: [0; 3],
            indicator: false,
        }
    }

    /// Last commanded angle of a servo
    pub fn angle(&self, servo: ServoId) -> u8 {
        self.angles[servo.index()]
    }

    pub fn indicator(&self) -> bool {
        self.indicator
    }
}

impl Default for SimulatedActuators {
    fn default() -> Self {
        Self::new(0.3)
    }
}

impl ActuatorPort for SimulatedActuators {
    fn read_force(&mut self, channel: ForceChannel) -> Result<u16> {
        let mut rng = rand::thread_rng();
        let value = if rng.gen_bool(self.load_probability) {
            rng.gen_range(500..=ADC_MAX)
        } else {
            rng.gen_range(0..200)
        };
        debug!("[SIM] {:?} force={}", channel, value);
        Ok(value)
    }

    fn set_servo_angle(&mut self, servo: ServoId, angle: u8) -> Result<()> {
        let angle = angle.min(180);
        info!(
            "[SERVO] {} angle={} deg duty={}",
            servo,
            angle,
            duty_for_angle(angle)
        );
        self.angles[servo.index()] = angle;
        Ok(())
    }

    fn set_indicator(&mut self, on: bool) -> Result<()> {
        if on != self.indicator {
            info!("[SIM] Indicator {}", if on { "on" } else { "off" });
        }
        self.indicator = on;
        Ok(())
    }
}
