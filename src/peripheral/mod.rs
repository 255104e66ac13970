//! Receiver-side peripherals
//!
//! The decision engine reaches the hardware only through [`ActuatorPort`]:
//! three force sensors on 12-bit ADC channels, three hobby servos and an
//! indicator LED.

mod sim;

pub use sim::SimulatedActuators;

use anyhow::Result;
use std::fmt;

/// Largest raw sample a 12-bit ADC produces
pub const ADC_MAX: u16 = 4095;

/// Servo angle commanded for an open actuator
pub const OPEN_ANGLE: u8 = 180;

/// Servo angle commanded for a closed actuator
pub const CLOSED_ANGLE: u8 = 0;

/// PWM duty at 0 degrees (50 Hz, 10-bit duty)
const MIN_DUTY: u16 = 26;

/// PWM duty at 180 degrees
const MAX_DUTY: u16 = 123;

/// One of the three force sensors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ForceChannel {
    One,
    Two,
    Three,
}

impl ForceChannel {
    pub const ALL: [ForceChannel; 3] = [ForceChannel::One, ForceChannel::Two, ForceChannel::Three];
}

/// One of the three servo-driven actuators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServoId {
    One,
    Two,
    Three,
}

impl ServoId {
    pub const ALL: [ServoId; 3] = [ServoId::One, ServoId::Two, ServoId::Three];

    /// Zero-based index into per-actuator arrays
    pub fn index(self) -> usize {
        match self {
            ServoId::One => 0,
            ServoId::Two => 1,
            ServoId::Three => 2,
        }
    }
}

impl fmt::Display for ServoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "servo{}", self.index() + 1)
    }
}

/// Hardware reached by the receiver's decision engine
pub trait ActuatorPort {
    /// Raw 12-bit sample from a force sensor
    fn read_force(&mut self, channel: ForceChannel) -> Result<u16>;

    /// Drive a servo to an angle in degrees (0..=180)
    fn set_servo_angle(&mut self, servo: ServoId, angle: u8) -> Result<()>;

    /// Switch the indicator LED
    fn set_indicator(&mut self, on: bool) -> Result<()>;
}

/// PWM duty for a servo angle; angles above 180 are clamped
pub fn duty_for_angle(angle: u8) -> u16 {
    let angle = u16::from(angle.min(180));
    MIN_DUTY + angle * (MAX_DUTY - MIN_DUTY) / 180
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duty_endpoints() {
        assert_eq!(duty_for_angle(CLOSED_ANGLE), 26);
        assert_eq!(duty_for_angle(OPEN_ANGLE), 123);
    }

    #[test]
    fn test_duty_midpoint_truncates() {
        // 26 + 90/180 * 97 = 74.5
        assert_eq!(duty_for_angle(90), 74);
    }

    #[test]
    fn test_duty_clamps_angle() {
        assert_eq!(duty_for_angle(255), 123);
    }

    #[test]
    fn test_servo_display() {
        assert_eq!(ServoId::Three.to_string(), "servo3");
        assert_eq!(ServoId::ALL.map(ServoId::index), [0, 1, 2]);
    }
}
