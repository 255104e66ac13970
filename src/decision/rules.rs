//! Actuation rules
//!
//! Pure evaluation of one receive cycle. Tiers are applied in a fixed order
//! by the engine: presence gate, indicator, authorization override.

use gatelink_shared::{RfidStatus, StatusMessage};

use crate::peripheral::{ServoId, CLOSED_ANGLE, OPEN_ANGLE};

/// Someone is present when a valid reading is at or below this range
pub const PRESENCE_RANGE_CM: f64 = 30.0;

/// Force threshold for actuator 1.
///
/// Note: this exceeds the 12-bit ADC range (max 4095), so the actuator 1
/// close rule fires on every in-range presence reading. The value is kept
/// as deployed on the rig; recalibrating it changes gate behavior.
pub const ACTUATOR1_FORCE_THRESHOLD: u16 = 10_000;

/// Force threshold for actuators 2 and 3 and the indicator
pub const FORCE_THRESHOLD: u16 = 500;

/// Logical position of an actuator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Open,
    Closed,
}

impl Position {
    /// Servo angle for this position
    pub fn angle(self) -> u8 {
        match self {
            Position::Open => OPEN_ANGLE,
            Position::Closed => CLOSED_ANGLE,
        }
    }
}

/// Positions of actuators 1, 2 and 3
pub type Pose = [Position; 3];

/// Resting pose: gates 1 and 2 open, gate 3 closed
pub const REST_POSE: Pose = [Position::Open, Position::Open, Position::Closed];

/// Pose held while an authorized card is honored
pub const GRANT_POSE: Pose = [Position::Closed, Position::Closed, Position::Open];

/// Indicator LED state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Indicator {
    On,
    #[default]
    Off,
}

impl Indicator {
    pub fn is_on(self) -> bool {
        self == Indicator::On
    }
}

/// Raw samples from the three force sensors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ForceReading(pub [u16; 3]);

impl ForceReading {
    pub fn new(force1: u16, force2: u16, force3: u16) -> Self {
        Self([force1, force2, force3])
    }

    pub fn get(&self, servo: ServoId) -> u16 {
        self.0[servo.index()]
    }
}

/// Authorization override triggered by an RFID read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    /// Authorized card: run the grant pose, dwell, revert
    Grant,
    /// Unknown card: notify only
    Deny,
}

/// Everything the engine must do for one cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Presence-tier command per actuator; `None` leaves the actuator alone
    pub presence: [Option<Position>; 3],
    pub indicator: Indicator,
    pub authorization: Option<Authorization>,
}

/// Evaluate the rules for one message and one set of force readings
pub fn decide(message: &StatusMessage, forces: &ForceReading) -> Decision {
    Decision {
        presence: presence_commands(message.distance_cm, forces),
        indicator: indicator_for(forces),
        authorization: match message.rfid_status {
            RfidStatus::Authorized => Some(Authorization::Grant),
            RfidStatus::Unauthorized => Some(Authorization::Deny),
            RfidStatus::Absent => None,
        },
    }
}

fn presence_commands(distance_cm: f64, forces: &ForceReading) -> [Option<Position>; 3] {
    // No one detected, or no valid reading
    if distance_cm > PRESENCE_RANGE_CM || distance_cm <= 0.0 {
        return REST_POSE.map(Some);
    }

    let mut commands = [None; 3];
    if forces.get(ServoId::One) <= ACTUATOR1_FORCE_THRESHOLD {
        commands[0] = Some(Position::Closed);
    }
    if forces.get(ServoId::Two) <= FORCE_THRESHOLD {
        commands[1] = Some(Position::Closed);
    }
    if forces.get(ServoId::Three) <= FORCE_THRESHOLD {
        commands[2] = Some(Position::Open);
    }
    commands
}

fn indicator_for(forces: &ForceReading) -> Indicator {
    if forces.get(ServoId::Two) >= FORCE_THRESHOLD && forces.get(ServoId::Three) >= FORCE_THRESHOLD {
        Indicator::Off
    } else {
        Indicator::On
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peripheral::ADC_MAX;

    const SAMPLES: [u16; 7] = [0, 120, 499, 500, 501, 2048, ADC_MAX];

    fn all_forces() -> impl Iterator<Item = ForceReading> {
        SAMPLES.iter().flat_map(|&a| {
            SAMPLES.iter().flat_map(move |&b| {
                SAMPLES.iter().map(move |&c| ForceReading::new(a, b, c))
            })
        })
    }

    const STATUSES: [RfidStatus; 3] = [
        RfidStatus::Unauthorized,
        RfidStatus::Absent,
        RfidStatus::Authorized,
    ];

    #[test]
    fn test_presence_gate_rests_when_nobody_near() {
        for distance in [30.01, 45.0, 400.0, 0.0, -1.0] {
            for forces in all_forces() {
                for status in STATUSES {
                    let decision = decide(&StatusMessage::new(distance, status), &forces);
                    assert_eq!(decision.presence, REST_POSE.map(Some));
                }
            }
        }
    }

    #[test]
    fn test_presence_closes_low_force_gate_two() {
        for distance in [0.5, 12.3, 30.0] {
            for forces in all_forces().filter(|f| f.get(ServoId::Two) <= FORCE_THRESHOLD) {
                let decision = decide(&StatusMessage::new(distance, RfidStatus::Absent), &forces);
                assert_eq!(decision.presence[1], Some(Position::Closed));
            }
        }
    }

    #[test]
    fn test_presence_opens_low_force_gate_three() {
        for forces in all_forces() {
            let decision = decide(&StatusMessage::new(10.0, RfidStatus::Absent), &forces);
            let expected = (forces.get(ServoId::Three) <= FORCE_THRESHOLD).then_some(Position::Open);
            assert_eq!(decision.presence[2], expected);
        }
    }

    #[test]
    fn test_gate_one_closes_for_any_adc_sample() {
        // ACTUATOR1_FORCE_THRESHOLD is above the ADC range
        for forces in all_forces() {
            let decision = decide(&StatusMessage::new(20.0, RfidStatus::Absent), &forces);
            assert_eq!(decision.presence[0], Some(Position::Closed));
        }
    }

    #[test]
    fn test_loaded_gates_left_alone() {
        let decision = decide(
            &StatusMessage::new(15.0, RfidStatus::Absent),
            &ForceReading::new(4000, 3000, 3000),
        );
        assert_eq!(decision.presence, [Some(Position::Closed), None, None]);
    }

    #[test]
    fn test_indicator_off_only_when_both_loaded() {
        for distance in [-1.0, 10.0, 80.0] {
            for forces in all_forces() {
                for status in STATUSES {
                    let decision = decide(&StatusMessage::new(distance, status), &forces);
                    let both_loaded = forces.get(ServoId::Two) >= FORCE_THRESHOLD
                        && forces.get(ServoId::Three) >= FORCE_THRESHOLD;
                    assert_eq!(decision.indicator == Indicator::Off, both_loaded);
                }
            }
        }
    }

    #[test]
    fn test_authorization_tier() {
        let forces = ForceReading::default();
        let grant = decide(&StatusMessage::new(10.0, RfidStatus::Authorized), &forces);
        let deny = decide(&StatusMessage::new(10.0, RfidStatus::Unauthorized), &forces);
        let none = decide(&StatusMessage::new(10.0, RfidStatus::Absent), &forces);

        assert_eq!(grant.authorization, Some(Authorization::Grant));
        assert_eq!(deny.authorization, Some(Authorization::Deny));
        assert_eq!(none.authorization, None);
    }

    #[test]
    fn test_position_angles() {
        assert_eq!(Position::Open.angle(), 180);
        assert_eq!(Position::Closed.angle(), 0);
    }
}
