//! Long-lived navigation loop.
//!
//! The daemon runs a select loop that:
//! 1. Applies control messages from [`NavHandle`]s, one at a time
//! 2. Turns platform pop signals into transitions
//! 3. Stops on [`ControlMsg::Shutdown`] or once every handle is dropped
//!
//! Committed transitions, whichever side started them, are published on a
//! broadcast channel.

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use waypoint_kernel::{
    MirrorAuthority, Navigation, RequestId, Target, TransitionCoordinator, TransitionReport,
};
use waypoint_platform::AdapterMode;
use waypoint_types::{Direction, Entry, EntryKey, JumpTarget, SetPatch};

use crate::{HostConfig, HostError};

const EVENT_CAPACITY: usize = 256;

/// Command for the daemon; each carries its reply channel.
#[derive(Debug)]
pub enum ControlMsg {
    Dispatch {
        nav: Navigation,
        resp: oneshot::Sender<Result<TransitionReport, HostError>>,
    },
    Confirm {
        proceed: bool,
        resp: oneshot::Sender<Result<TransitionReport, HostError>>,
    },
    Set {
        patch: SetPatch,
        target: Option<EntryKey>,
        resp: oneshot::Sender<Result<TransitionReport, HostError>>,
    },
    Snapshot {
        resp: oneshot::Sender<StackSnapshot>,
    },
    Shutdown {
        resp: oneshot::Sender<()>,
    },
}

/// Read-only view of the coordinator at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StackSnapshot {
    pub entries: Vec<Entry>,
    pub current_index: usize,
    pub direction: Direction,
    pub mode: AdapterMode,
    pub authority: MirrorAuthority,
    /// Request waiting for `confirm`, if any.
    pub parked: Option<RequestId>,
}

impl StackSnapshot {
    pub fn of(coordinator: &TransitionCoordinator) -> Self {
        Self {
            entries: coordinator.entries().to_vec(),
            current_index: coordinator.current_index(),
            direction: coordinator.direction(),
            mode: coordinator.mode(),
            authority: coordinator.authority(),
            parked: coordinator.parked().map(|req| req.id),
        }
    }

    pub fn current(&self) -> &Entry {
        &self.entries[self.current_index]
    }
}

pub struct NavDaemon {
    coordinator: TransitionCoordinator,
    control_rx: mpsc::Receiver<ControlMsg>,
    events: broadcast::Sender<TransitionReport>,
}

impl NavDaemon {
    pub fn new(
        coordinator: TransitionCoordinator,
        control_rx: mpsc::Receiver<ControlMsg>,
        events: broadcast::Sender<TransitionReport>,
    ) -> Self {
        Self {
            coordinator,
            control_rx,
            events,
        }
    }

    /// Starts the loop on the current runtime. The task hands the
    /// coordinator back when it stops.
    pub fn spawn(
        coordinator: TransitionCoordinator,
        config: &HostConfig,
    ) -> (NavHandle, JoinHandle<TransitionCoordinator>) {
        let (control_tx, control_rx) = mpsc::channel(config.control_capacity);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let handle = NavHandle {
            control_tx,
            events: events.clone(),
        };
        let daemon = Self::new(coordinator, control_rx, events);
        (handle, tokio::spawn(daemon.run()))
    }

    pub async fn run(mut self) -> TransitionCoordinator {
        tracing::info!(
            entries = self.coordinator.entries().len(),
            index = self.coordinator.current_index(),
            "navigation daemon started"
        );
        let mut signals_open = true;
        loop {
            tokio::select! {
                msg = self.control_rx.recv() => {
                    match msg {
                        Some(ControlMsg::Shutdown { resp }) => {
                            tracing::info!("shutdown requested via control channel");
                            let _ = resp.send(());
                            break;
                        }
                        Some(cmd) => self.apply_control(cmd).await,
                        None => {
                            tracing::debug!("all handles dropped");
                            break;
                        }
                    }
                }
                signal = self.coordinator.recv_signal(), if signals_open => {
                    match signal {
                        Some(signal) => {
                            let url = signal.url.clone();
                            match self.coordinator.handle_pop(signal).await {
                                Ok(Some(report)) => self.publish(&report),
                                Ok(None) => {}
                                Err(err) => tracing::warn!(%url, "pop failed: {err}"),
                            }
                        }
                        None => {
                            tracing::debug!("pop signal channel closed");
                            signals_open = false;
                        }
                    }
                }
            }
        }
        tracing::info!("navigation daemon stopped");
        self.coordinator
    }

    async fn apply_control(&mut self, cmd: ControlMsg) {
        match cmd {
            ControlMsg::Dispatch { nav, resp } => {
                let res = self.coordinator.dispatch(nav).await;
                self.reply(resp, res);
            }
            ControlMsg::Confirm { proceed, resp } => {
                let res = self.coordinator.confirm(proceed).await;
                self.reply(resp, res);
            }
            ControlMsg::Set {
                patch,
                target,
                resp,
            } => {
                let res = self.coordinator.set(patch, target.as_ref()).await;
                self.reply(resp, res);
            }
            ControlMsg::Snapshot { resp } => {
                let _ = resp.send(StackSnapshot::of(&self.coordinator));
            }
            ControlMsg::Shutdown { resp } => {
                let _ = resp.send(());
            }
        }
    }

    fn reply(
        &self,
        resp: oneshot::Sender<Result<TransitionReport, HostError>>,
        res: Result<TransitionReport, waypoint_kernel::NavError>,
    ) {
        match &res {
            Ok(report) => self.publish(report),
            Err(err) => tracing::warn!("navigation failed: {err}"),
        }
        let _ = resp.send(res.map_err(HostError::from));
    }

    fn publish(&self, report: &TransitionReport) {
        if !report.chain().any(TransitionReport::committed) {
            return;
        }
        let last = report.last();
        tracing::info!(
            request = %report.request,
            kind = ?report.kind,
            path = last.entry.as_ref().map(|e| e.segments.path.as_str()),
            "transition committed"
        );
        // no subscribers is fine
        let _ = self.events.send(report.clone());
    }
}

/// Cloneable front end of a running [`NavDaemon`].
#[derive(Debug, Clone)]
pub struct NavHandle {
    control_tx: mpsc::Sender<ControlMsg>,
    events: broadcast::Sender<TransitionReport>,
}

impl NavHandle {
    pub async fn dispatch(&self, nav: Navigation) -> Result<TransitionReport, HostError> {
        self.request(|resp| ControlMsg::Dispatch { nav, resp }).await?
    }

    pub async fn push(&self, target: impl Into<Target>) -> Result<TransitionReport, HostError> {
        self.dispatch(Navigation::Push(target.into())).await
    }

    pub async fn replace(&self, target: impl Into<Target>) -> Result<TransitionReport, HostError> {
        self.dispatch(Navigation::Replace(target.into())).await
    }

    pub async fn jump(&self, target: JumpTarget) -> Result<TransitionReport, HostError> {
        self.dispatch(Navigation::Jump(target)).await
    }

    pub async fn reset(
        &self,
        entries: Vec<Entry>,
        index: Option<usize>,
        direction: Option<Direction>,
    ) -> Result<TransitionReport, HostError> {
        self.dispatch(Navigation::Reset {
            entries,
            index,
            direction,
        })
        .await
    }

    pub async fn confirm(&self, proceed: bool) -> Result<TransitionReport, HostError> {
        self.request(|resp| ControlMsg::Confirm { proceed, resp }).await?
    }

    pub async fn set(&self, patch: SetPatch, target: Option<EntryKey>) -> Result<TransitionReport, HostError> {
        self.request(|resp| ControlMsg::Set {
            patch,
            target,
            resp,
        })
        .await?
    }

    pub async fn snapshot(&self) -> Result<StackSnapshot, HostError> {
        self.request(|resp| ControlMsg::Snapshot { resp }).await
    }

    pub async fn shutdown(&self) -> Result<(), HostError> {
        self.request(|resp| ControlMsg::Shutdown { resp }).await
    }

    /// Committed transitions from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<TransitionReport> {
        self.events.subscribe()
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> ControlMsg,
    ) -> Result<T, HostError> {
        let (resp, rx) = oneshot::channel();
        self.control_tx
            .send(make(resp))
            .await
            .map_err(|_| HostError::Closed)?;
        rx.await.map_err(|_| HostError::Closed)
    }
}
