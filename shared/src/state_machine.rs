//! Rendezvous State Machines
//!
//! Defines the valid transitions of the sender's channel sweep and the
//! receiver's passive listen session. Both machines are pure: the drivers in
//! [`crate::rendezvous`] perform the radio I/O and feed the outcomes back in
//! as events.

use crate::{PeerAddress, RadioChannel};

/// States of the sender's active channel sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    /// Sweep not started
    Init,
    /// Probing a channel for the receiver
    Scanning { channel: RadioChannel },
    /// A channel was selected (terminal)
    Converged {
        channel: RadioChannel,
        /// True when no channel acknowledged and the default was taken
        fallback: bool,
    },
}

/// Events that drive the sender's sweep
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    /// Begin the sweep at the lowest channel
    Start,
    /// The acknowledgment payload arrived on the current channel
    AckReceived,
    /// No acknowledgment arrived before the reply timeout
    NoAck,
}

/// States of the receiver's passive listen session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenState {
    /// Waiting for any inbound datagram
    Listening,
    /// Sender registered, acknowledgment not yet delivered
    PeerRegistered { peer: PeerAddress },
    /// Acknowledgment sent (terminal)
    Done { peer: PeerAddress },
}

/// Events that drive the receiver's listen session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenEvent {
    /// The wait expired with no datagram
    Timeout,
    /// A datagram arrived and its sender was registered as a peer
    Registered(PeerAddress),
    /// A datagram arrived but the sender could not be registered
    RegistrationFailed,
    /// The acknowledgment was handed to the link
    AckSent,
    /// The acknowledgment could not be sent
    AckFailed,
}

/// Result of a state transition attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult<S, E> {
    /// Transition was valid and state changed (or was re-entered)
    Success(S),
    /// Transition was invalid from current state
    Invalid { from: S, event: E },
}

/// The sender's channel sweep
#[derive(Debug)]
pub struct ChannelScan {
    current_state: ScanState,
    channels_tried: u8,
}

impl Default for ChannelScan {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelScan {
    /// Create a sweep in the Init state
    pub fn new() -> Self {
        Self {
            current_state: ScanState::Init,
            channels_tried: 0,
        }
    }

    /// Get current state
    pub fn state(&self) -> ScanState {
        self.current_state
    }

    /// Number of channels probed so far
    pub fn channels_tried(&self) -> u8 {
        self.channels_tried
    }

    /// Whether the sweep has reached its terminal state
    pub fn is_converged(&self) -> bool {
        matches!(self.current_state, ScanState::Converged { .. })
    }

    /// Process an event and return the transition result
    pub fn process_event(&mut self, event: ScanEvent) -> TransitionResult<ScanState, ScanEvent> {
        match self.get_next_state(&event) {
            Some(state) => {
                if let ScanState::Scanning { .. } = state {
                    self.channels_tried += 1;
                }
                self.current_state = state;
                TransitionResult::Success(state)
            }
            None => TransitionResult::Invalid {
                from: self.current_state,
                event,
            },
        }
    }

    fn get_next_state(&self, event: &ScanEvent) -> Option<ScanState> {
        use ScanEvent::*;
        use ScanState::*;

        match (self.current_state, event) {
            (Init, Start) => Some(Scanning {
                channel: RadioChannel::all().next()?,
            }),

            (Scanning { channel }, AckReceived) => Some(Converged {
                channel,
                fallback: false,
            }),

            (Scanning { channel }, NoAck) => match channel.next() {
                Some(next) => Some(Scanning { channel: next }),
                None => Some(Converged {
                    channel: RadioChannel::fallback(),
                    fallback: true,
                }),
            },

            _ => None,
        }
    }
}

/// The receiver's listen session
#[derive(Debug)]
pub struct ListenSession {
    current_state: ListenState,
    attempts: u32,
}

impl Default for ListenSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ListenSession {
    /// Create a session in the Listening state
    pub fn new() -> Self {
        Self {
            current_state: ListenState::Listening,
            attempts: 0,
        }
    }

    /// Get current state
    pub fn state(&self) -> ListenState {
        self.current_state
    }

    /// Number of listen waits that ended without a result
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// The registered peer once rendezvous has completed
    pub fn peer(&self) -> Option<PeerAddress> {
        match self.current_state {
            ListenState::Done { peer } => Some(peer),
            _ => None,
        }
    }

    /// Process an event and return the transition result
    pub fn process_event(
        &mut self,
        event: ListenEvent,
    ) -> TransitionResult<ListenState, ListenEvent> {
        match self.get_next_state(&event) {
            Some(state) => {
                if state == ListenState::Listening {
                    self.attempts += 1;
                }
                self.current_state = state;
                TransitionResult::Success(state)
            }
            None => TransitionResult::Invalid {
                from: self.current_state,
                event,
            },
        }
    }

    fn get_next_state(&self, event: &ListenEvent) -> Option<ListenState> {
        use ListenEvent::*;
        use ListenState::*;

        match (self.current_state, event) {
            (Listening, Timeout) => Some(Listening),
            (Listening, RegistrationFailed) => Some(Listening),
            (Listening, Registered(peer)) => Some(PeerRegistered { peer: *peer }),

            (PeerRegistered { peer }, AckSent) => Some(Done { peer }),
            // The peer stays registered; the next datagram re-registers benignly
            (PeerRegistered { .. }, AckFailed) => Some(Listening),

            _ => None,
        }
    }
}
