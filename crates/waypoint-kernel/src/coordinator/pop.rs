use tokio::sync::mpsc;
use waypoint_platform::{PlatformHistoryAdapter, PopSignal, Reconciliation};

use super::TransitionCoordinator;
use crate::request::Plan;
use crate::{Landing, NavError, Origin, PopDecision, Request, RequestKind, TransitionReport};

/// Next signal from the channel; never resolves when there is none.
pub(super) async fn recv_or_pending(
    signals: &mut Option<mpsc::UnboundedReceiver<PopSignal>>,
) -> Option<PopSignal> {
    match signals {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn landing_of(signal: &PopSignal) -> Option<Landing> {
    PlatformHistoryAdapter::landed_on(signal).map(|blob| Landing {
        index: blob.index,
        key: blob.key,
    })
}

impl TransitionCoordinator {
    /// Processes a platform "moved in history" signal.
    ///
    /// Returns `None` when the signal was an echo of our own move or the
    /// platform landed on the entry that is already current.
    pub async fn handle_pop(&mut self, signal: PopSignal) -> Result<Option<TransitionReport>, NavError> {
        let echo = self.adapter.take_echo(&signal);
        let landing = landing_of(&signal);
        match self.queue.decide(&signal, echo, landing.as_ref()) {
            PopDecision::Ignore => {
                log::trace!("ignoring echo of our own move to {}", signal.url);
                Ok(None)
            }
            PopDecision::Start => {
                self.discard_parked();
                let Some(req) = self.pop_request(&signal) else {
                    return Ok(None);
                };
                log::debug!("pop to {} started request {}", signal.url, req.id);
                self.run(req, 0).await.map(Some)
            }
            decision => {
                log::warn!("pop to {} arrived while busy ({decision:?}); dropped", signal.url);
                Ok(None)
            }
        }
    }

    /// Waits for the next platform signal. `None` once the channel closed or
    /// when the coordinator was opened without one. Cancel safe.
    pub async fn recv_signal(&mut self) -> Option<PopSignal> {
        self.signals.as_mut()?.recv().await
    }

    /// Waits for signals until one produces a transition.
    pub async fn next_pop(&mut self) -> Result<Option<TransitionReport>, NavError> {
        while let Some(signal) = self.recv_signal().await {
            if let Some(report) = self.handle_pop(signal).await? {
                return Ok(Some(report));
            }
        }
        Ok(None)
    }

    /// Handles every signal already queued without waiting for more.
    pub async fn settle(&mut self) -> Result<Vec<TransitionReport>, NavError> {
        let mut reports = Vec::new();
        while let Some(signal) = self.signals.as_mut().and_then(|rx| rx.try_recv().ok()) {
            if let Some(report) = self.handle_pop(signal).await? {
                reports.push(report);
            }
        }
        Ok(reports)
    }

    /// Applies the queue discipline to a signal that arrived mid-request.
    /// Returns the signal when it supersedes the in-flight request.
    pub(super) fn signal_in_flight(&mut self, signal: PopSignal) -> Option<PopSignal> {
        let echo = self.adapter.take_echo(&signal);
        let landing = landing_of(&signal);
        match self.queue.decide(&signal, echo, landing.as_ref()) {
            PopDecision::Ignore => log::trace!("ignoring echo of our own move to {}", signal.url),
            PopDecision::Compensate { delta } => {
                let Some(expected) = self.queue.in_flight().map(|flight| flight.expected_key.clone()) else {
                    return None;
                };
                if let Err(err) = self.adapter.compensate(delta, expected) {
                    log::warn!("compensating pop to {} failed: {err}", signal.url);
                }
            }
            PopDecision::Supersede => return Some(signal),
            PopDecision::Defer => {
                log::debug!("pop to {} deferred until the committed request finishes", signal.url)
            }
            PopDecision::Start => log::warn!("pop to {} found no request in flight", signal.url),
        }
        None
    }

    fn pop_request(&mut self, signal: &PopSignal) -> Option<Request> {
        let landing = self.adapter.reconcile(signal, &self.stack);
        let current = self.stack.current_index() as i64;
        let (target, platform_delta) = match &landing {
            Reconciliation::Aligned { index } if *index == self.stack.current_index() => {
                log::debug!("pop landed on the current entry {}", self.stack.current().key);
                return None;
            }
            Reconciliation::Aligned { index } => {
                (self.stack.entries()[*index].clone(), Some(*index as i64 - current))
            }
            Reconciliation::Diverged { stack } => {
                let landed = (stack.offset() + stack.current_index()) as i64;
                let from = (self.stack.offset() + self.stack.current_index()) as i64;
                (stack.current().clone(), Some(landed - from))
            }
            Reconciliation::Foreign { entry } => (entry.clone(), None),
        };
        let plan = Plan::Pop {
            landing,
            platform_delta,
            restored: false,
        };
        let id = self.next_request_id();
        Some(Request::new(id, RequestKind::Pop, Origin::Platform, target, plan))
    }
}
