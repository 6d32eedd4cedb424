//! Discipline for platform "moved in history" signals.
//!
//! Only one platform-originated request is processed at a time. Signals that
//! arrive while something is in flight are either swallowed (our own moves),
//! compensated (the platform is moved back so the net movement stays a
//! single step), used to supersede an uncommitted UI request, or deferred
//! until a committed UI request has finished its rewind phase.

use waypoint_platform::PopSignal;
use waypoint_types::EntryKey;

use crate::{Origin, Phase, RequestId};

/// Where a signal says the platform landed, decoded from the entry's blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Landing {
    pub index: usize,
    pub key: EntryKey,
}

/// The request currently being processed and where the platform should be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InFlight {
    pub id: RequestId,
    pub origin: Origin,
    pub phase: Phase,
    pub expected_index: usize,
    pub expected_key: EntryKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopDecision {
    /// The platform reporting one of our own moves.
    Ignore,
    Start,
    /// Move the platform by `delta` to undo the signalled movement.
    Compensate { delta: i64 },
    /// Abort the in-flight UI request and process the signal instead.
    Supersede,
    /// Process the signal once the in-flight request finishes.
    Defer,
}

#[derive(Debug, Default)]
pub struct PopQueue {
    in_flight: Option<InFlight>,
    deferred: Option<PopSignal>,
}

impl PopQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, flight: InFlight) {
        if let Some(previous) = self.in_flight.replace(flight) {
            log::debug!("request {} replaced in flight", previous.id);
        }
    }

    pub fn enter_rewind(&mut self) {
        if let Some(flight) = self.in_flight.as_mut() {
            flight.phase = Phase::Rewind;
        }
    }

    /// Ends the in-flight request and hands back a deferred signal, if any.
    pub fn finish(&mut self) -> Option<PopSignal> {
        self.in_flight = None;
        self.deferred.take()
    }

    pub fn in_flight(&self) -> Option<&InFlight> {
        self.in_flight.as_ref()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn has_deferred(&self) -> bool {
        self.deferred.is_some()
    }

    /// Classifies an incoming signal. `echo` marks a signal the adapter
    /// recognised as the result of our own move.
    pub fn decide(&mut self, signal: &PopSignal, echo: bool, landing: Option<&Landing>) -> PopDecision {
        if echo {
            return PopDecision::Ignore;
        }
        let Some(flight) = self.in_flight.as_mut() else {
            return PopDecision::Start;
        };
        let compensate = PopDecision::Compensate {
            delta: -signal_direction(landing, flight.expected_index),
        };
        match (flight.origin, flight.phase) {
            (Origin::Platform, _) => compensate,
            (Origin::Ui, Phase::Approach) => PopDecision::Supersede,
            (Origin::Ui, Phase::Rewind) if self.deferred.is_none() => {
                // the platform now rests where the deferred signal landed
                if let Some(landing) = landing {
                    flight.expected_index = landing.index;
                    flight.expected_key = landing.key.clone();
                }
                self.deferred = Some(signal.clone());
                PopDecision::Defer
            }
            (Origin::Ui, Phase::Rewind) => compensate,
        }
    }
}

/// Sign of the movement a signal reports relative to where the platform
/// should be. Without a decodable landing the move is taken as backward.
fn signal_direction(landing: Option<&Landing>, expected_index: usize) -> i64 {
    match landing {
        Some(landing) => (landing.index as i64 - expected_index as i64).signum(),
        None => -1,
    }
}
