//! Decision engine - applies the actuation rules to each received message

use gatelink_shared::{decode, DecodeError, StatusMessage};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::rules::{self, Authorization, Decision, ForceReading, Indicator, Pose, Position};
use crate::notify::{NotificationEvent, Notifier};
use crate::peripheral::{ActuatorPort, ForceChannel, ServoId};

/// Reasons a cycle is skipped without actuation
#[derive(Error, Debug)]
pub enum CycleError {
    #[error("Malformed payload: {0}")]
    Decode(#[from] DecodeError),

    #[error("Force sensor {channel:?} read failed: {reason}")]
    Sensor {
        channel: ForceChannel,
        reason: anyhow::Error,
    },
}

/// Last commanded position of each actuator plus the indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActuationState {
    pub actuators: Pose,
    pub indicator: Indicator,
}

impl Default for ActuationState {
    /// Power-on state: servos parked closed, LED off
    fn default() -> Self {
        Self {
            actuators: [Position::Closed; 3],
            indicator: Indicator::Off,
        }
    }
}

/// Result of a completed cycle
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub message: StatusMessage,
    pub forces: ForceReading,
    pub decision: Decision,
    pub notification: Option<NotificationEvent>,
    /// State after every command of the cycle was applied
    pub state: ActuationState,
}

/// Owns the actuators and turns status messages into commands
pub struct DecisionEngine<P, N> {
    port: P,
    notifier: N,
    state: ActuationState,
    dwell: Duration,
    cycles: u64,
}

impl<P: ActuatorPort, N: Notifier> DecisionEngine<P, N> {
    /// Create an engine holding the authorized pose for `dwell`
    pub fn new(port: P, notifier: N, dwell: Duration) -> Self {
        Self {
            port,
            notifier,
            state: ActuationState::default(),
            dwell,
            cycles: 0,
        }
    }

    /// Current actuation state
    pub fn state(&self) -> ActuationState {
        self.state
    }

    /// Number of completed cycles
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Run one cycle for a raw payload
    ///
    /// A payload that fails to decode skips the cycle: no sensor reads, no
    /// commands, no state change.
    pub async fn handle_payload(&mut self, payload: &[u8]) -> Result<CycleReport, CycleError> {
        let message = decode(payload)?;
        self.handle_message(message).await
    }

    /// Run one cycle for a decoded message
    pub async fn handle_message(
        &mut self,
        message: StatusMessage,
    ) -> Result<CycleReport, CycleError> {
        info!(
            "[ENGINE] Distance {} cm, RFID {:?}",
            message.distance_cm, message.rfid_status
        );

        let forces = self.read_forces()?;
        debug!("[ENGINE] Force readings {:?}", forces.0);

        let decision = rules::decide(&message, &forces);

        for servo in ServoId::ALL {
            if let Some(position) = decision.presence[servo.index()] {
                self.command(servo, position);
            }
        }

        self.set_indicator(decision.indicator);

        let notification = match decision.authorization {
            Some(Authorization::Grant) => {
                info!("[ENGINE] Authorized card, holding grant pose for {:?}", self.dwell);
                self.apply_pose(rules::GRANT_POSE);
                tokio::time::sleep(self.dwell).await;
                self.apply_pose(rules::REST_POSE);
                Some(NotificationEvent::authorized_card())
            }
            Some(Authorization::Deny) => {
                info!("[ENGINE] Unknown card");
                Some(NotificationEvent::unknown_card())
            }
            None => None,
        };

        if let Some(event) = &notification {
            self.notifier.notify(event).await;
        }

        self.cycles += 1;

        Ok(CycleReport {
            message,
            forces,
            decision,
            notification,
            state: self.state,
        })
    }

    fn read_forces(&mut self) -> Result<ForceReading, CycleError> {
        let mut samples = [0u16; 3];
        for (sample, channel) in samples.iter_mut().zip(ForceChannel::ALL) {
            *sample = self
                .port
                .read_force(channel)
                .map_err(|reason| CycleError::Sensor { channel, reason })?;
        }
        Ok(ForceReading(samples))
    }

    fn apply_pose(&mut self, pose: Pose) {
        for servo in ServoId::ALL {
            self.command(servo, pose[servo.index()]);
        }
    }

    /// Drive one servo; the state only records commands the port accepted
    fn command(&mut self, servo: ServoId, position: Position) {
        match self.port.set_servo_angle(servo, position.angle()) {
            Ok(()) => self.state.actuators[servo.index()] = position,
            Err(e) => warn!("[ENGINE] {} command {:?} failed: {}", servo, position, e),
        }
    }

    fn set_indicator(&mut self, indicator: Indicator) {
        match self.port.set_indicator(indicator.is_on()) {
            Ok(()) => self.state.indicator = indicator,
            Err(e) => warn!("[ENGINE] Indicator command failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use gatelink_shared::RfidStatus;
    use std::sync::Mutex;
    use tokio::time::Instant;

    const DWELL: Duration = Duration::from_secs(5);

    /// Port with fixed force samples that records every command
    #[derive(Default)]
    struct RecordingPort {
        forces: [u16; 3],
        fail_force: bool,
        fail_servo: Option<ServoId>,
        servo_log: Vec<(ServoId, u8, Instant)>,
        indicator_log: Vec<bool>,
    }

    impl RecordingPort {
        fn with_forces(forces: [u16; 3]) -> Self {
            Self {
                forces,
                ..Default::default()
            }
        }
    }

    impl ActuatorPort for RecordingPort {
        fn read_force(&mut self, channel: ForceChannel) -> anyhow::Result<u16> {
            if self.fail_force {
                return Err(anyhow!("adc timeout"));
            }
            let index = ForceChannel::ALL.iter().position(|c| *c == channel).unwrap();
            Ok(self.forces[index])
        }

        fn set_servo_angle(&mut self, servo: ServoId, angle: u8) -> anyhow::Result<()> {
            if self.fail_servo == Some(servo) {
                return Err(anyhow!("pwm fault"));
            }
            self.servo_log.push((servo, angle, Instant::now()));
            Ok(())
        }

        fn set_indicator(&mut self, on: bool) -> anyhow::Result<()> {
            self.indicator_log.push(on);
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        events: Mutex<Vec<NotificationEvent>>,
    }

    impl RecordingNotifier {
        fn events(&self) -> Vec<NotificationEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, event: &NotificationEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    fn engine(forces: [u16; 3]) -> DecisionEngine<RecordingPort, RecordingNotifier> {
        DecisionEngine::new(
            RecordingPort::with_forces(forces),
            RecordingNotifier::default(),
            DWELL,
        )
    }

    fn angles(log: &[(ServoId, u8, Instant)]) -> Vec<(ServoId, u8)> {
        log.iter().map(|(s, a, _)| (*s, *a)).collect()
    }

    #[tokio::test]
    async fn test_nobody_near_rests_gates() {
        let mut engine = engine([0, 0, 0]);
        let report = engine.handle_payload(b"85.2,0").await.unwrap();

        assert_eq!(report.state.actuators, rules::REST_POSE);
        assert_eq!(
            angles(&engine.port().servo_log),
            vec![(ServoId::One, 180), (ServoId::Two, 180), (ServoId::Three, 0)]
        );
        assert_eq!(report.notification, None);
        assert!(engine.notifier().events().is_empty());
    }

    #[tokio::test]
    async fn test_presence_commands_only_low_force_gates() {
        let mut engine = engine([100, 3000, 3000]);
        let report = engine.handle_payload(b"12.0,0").await.unwrap();

        // Gate 1 closes, gates 2 and 3 are loaded and left alone
        assert_eq!(angles(&engine.port().servo_log), vec![(ServoId::One, 0)]);
        assert_eq!(
            report.state.actuators,
            [Position::Closed, Position::Closed, Position::Closed]
        );
        assert_eq!(report.state.indicator, Indicator::Off);
    }

    #[tokio::test]
    async fn test_indicator_on_when_a_plate_is_empty() {
        let mut engine = engine([0, 600, 100]);
        let report = engine.handle_payload(b"40,0").await.unwrap();

        assert_eq!(report.state.indicator, Indicator::On);
        assert_eq!(engine.port().indicator_log, vec![true]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_authorized_card_runs_grant_sequence() {
        let mut engine = engine([0, 0, 0]);

        let start = Instant::now();
        let report = engine.handle_payload(b"20.5,1").await.unwrap();
        assert!(start.elapsed() >= DWELL);

        let log = &engine.port().servo_log;
        // Presence tier (3 commands), grant pose (3), rest pose (3)
        assert_eq!(log.len(), 9);
        assert_eq!(
            angles(&log[3..6]),
            vec![(ServoId::One, 0), (ServoId::Two, 0), (ServoId::Three, 180)]
        );
        assert_eq!(
            angles(&log[6..]),
            vec![(ServoId::One, 180), (ServoId::Two, 180), (ServoId::Three, 0)]
        );
        // The grant pose is held for the full dwell
        assert!(log[6].2 - log[5].2 >= DWELL);

        assert_eq!(report.state.actuators, rules::REST_POSE);
        assert_eq!(report.notification, Some(NotificationEvent::authorized_card()));
        assert_eq!(
            engine.notifier().events(),
            vec![NotificationEvent::authorized_card()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_authorized_card_overrides_absent_presence() {
        let mut engine = engine([4095, 4095, 4095]);
        let report = engine.handle_payload(b"-1,1").await.unwrap();

        assert_eq!(report.state.actuators, rules::REST_POSE);
        assert_eq!(engine.notifier().events().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_card_notifies_without_extra_actuation() {
        let mut engine = engine([0, 0, 0]);
        let report = engine.handle_payload(b"50,-1").await.unwrap();

        assert_eq!(engine.port().servo_log.len(), 3);
        assert_eq!(report.notification, Some(NotificationEvent::unknown_card()));
        assert_eq!(
            engine.notifier().events(),
            vec![NotificationEvent::unknown_card()]
        );
    }

    #[tokio::test]
    async fn test_boundary_payloads_rest_without_notifying() {
        let mut engine = engine([0, 0, 0]);

        // Just past the presence range: nobody near
        let report = engine.handle_payload(b"30.0000001,0").await.unwrap();
        assert_eq!(report.decision.presence, rules::REST_POSE.map(Some));

        // A code that is not exactly 1 grants nothing
        let report = engine.handle_payload(b"10,1.00000001").await.unwrap();
        assert_eq!(report.decision.authorization, None);
        assert_eq!(report.notification, None);
        assert!(engine.notifier().events().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_payload_skips_cycle() {
        let mut engine = engine([0, 0, 0]);
        let before = engine.state();

        let err = engine.handle_payload(b"near,1").await.unwrap_err();
        assert!(matches!(err, CycleError::Decode(_)));
        assert!(engine.port().servo_log.is_empty());
        assert!(engine.port().indicator_log.is_empty());
        assert_eq!(engine.state(), before);
        assert_eq!(engine.cycles(), 0);
    }

    #[tokio::test]
    async fn test_reset_payload_rests_gates() {
        let mut engine = engine([0, 0, 0]);
        let report = engine.handle_payload(b"Starting...").await.unwrap();

        assert_eq!(report.message, StatusMessage::reset());
        assert_eq!(report.state.actuators, rules::REST_POSE);
        assert_eq!(engine.cycles(), 1);
    }

    #[tokio::test]
    async fn test_sensor_failure_skips_cycle() {
        let mut engine = DecisionEngine::new(
            RecordingPort {
                fail_force: true,
                ..Default::default()
            },
            RecordingNotifier::default(),
            DWELL,
        );

        let err = engine
            .handle_message(StatusMessage::new(10.0, RfidStatus::Authorized))
            .await
            .unwrap_err();
        assert!(matches!(err, CycleError::Sensor { channel: ForceChannel::One, .. }));
        assert!(engine.port().servo_log.is_empty());
        assert!(engine.notifier().events().is_empty());
    }

    #[tokio::test]
    async fn test_failed_servo_keeps_previous_state() {
        let mut engine = DecisionEngine::new(
            RecordingPort {
                fail_servo: Some(ServoId::One),
                ..Default::default()
            },
            RecordingNotifier::default(),
            DWELL,
        );

        let report = engine.handle_payload(b"90,0").await.unwrap();
        assert_eq!(
            report.state.actuators,
            [Position::Closed, Position::Open, Position::Closed]
        );
    }
}
