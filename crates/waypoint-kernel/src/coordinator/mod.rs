//! The orchestrator: turns UI intents and platform signals into requests,
//! drives them through the pipeline and performs the single commit that
//! updates the stack, the platform history and the mirror together.

mod drive;
mod pop;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use waypoint_platform::{
    AdapterMode, EntryBlob, HistoryPrimitive, MirrorRecord, MirrorStore, PlatformHistoryAdapter,
    PlatformOp, PopSignal,
};
use waypoint_types::{
    Direction, Entry, EntryKey, EntryStack, JumpTarget, PathCodec, SetPatch, StackChange,
    UrlPathCodec,
};

use crate::request::Plan;
use crate::{
    CoordinatorConfig, NavError, Navigation, Origin, PopQueue, Request, RequestId, RequestKind,
    RequestStatus, TransitionPipeline, TransitionReport,
};

/// Which durable copy of the stack is trusted. Chosen once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MirrorAuthority {
    Store,
    EntryBlob,
}

/// Entries the stack starts from, overriding anything persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Seed {
    pub entries: Vec<Entry>,
    pub index: Option<usize>,
}

pub struct TransitionCoordinator {
    stack: EntryStack,
    adapter: PlatformHistoryAdapter,
    mirror: Box<dyn MirrorStore>,
    authority: MirrorAuthority,
    pipeline: Arc<TransitionPipeline>,
    queue: PopQueue,
    signals: Option<mpsc::UnboundedReceiver<PopSignal>>,
    parked: Option<Request>,
    next_id: u64,
    config: CoordinatorConfig,
}

impl std::fmt::Debug for TransitionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransitionCoordinator")
            .field("stack", &self.stack)
            .field("adapter", &self.adapter)
            .field("authority", &self.authority)
            .field("pipeline", &self.pipeline)
            .field("parked", &self.parked.as_ref().map(|req| req.id))
            .finish()
    }
}

pub struct CoordinatorBuilder<P, M> {
    primitive: P,
    mirror: M,
    codec: Arc<dyn PathCodec>,
    pipeline: TransitionPipeline,
    config: CoordinatorConfig,
    seed: Option<Seed>,
    signals: Option<mpsc::UnboundedReceiver<PopSignal>>,
}

impl<P, M> CoordinatorBuilder<P, M>
where
    P: HistoryPrimitive + 'static,
    M: MirrorStore + 'static,
{
    pub fn codec(mut self, codec: Arc<dyn PathCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn pipeline(mut self, pipeline: TransitionPipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn seed(mut self, entries: Vec<Entry>, index: Option<usize>) -> Self {
        self.seed = Some(Seed { entries, index });
        self
    }

    /// Channel on which the environment delivers pop signals.
    pub fn signals(mut self, signals: mpsc::UnboundedReceiver<PopSignal>) -> Self {
        self.signals = Some(signals);
        self
    }

    /// Seeds the stack and stamps the platform.
    ///
    /// Seed order: explicit seed entries, then the authoritative durable copy
    /// (mirror record checked against the landed entry, or the stack embedded
    /// in the landed entry's blob), then a single entry for the current URL.
    pub async fn open(self) -> Result<TransitionCoordinator, NavError> {
        let adapter = PlatformHistoryAdapter::new(self.primitive, self.codec, self.config.adapter());
        let mirror: Box<dyn MirrorStore> = Box::new(self.mirror);
        let authority = if mirror.available() {
            MirrorAuthority::Store
        } else {
            log::warn!("mirror store unavailable; entry blobs are authoritative");
            MirrorAuthority::EntryBlob
        };
        let landed = adapter.landed();

        let (stack, op) = match self.seed {
            Some(seed) => {
                let stack = EntryStack::from_entries(seed.entries, seed.index, Direction::Stay)?;
                let op = PlatformOp::Rewrite {
                    from_index: 0,
                    from_key: stack.entries()[0].key.clone(),
                    from_first: stack.entries()[0].key.clone(),
                };
                (stack, op)
            }
            None => {
                let stack = restore(authority, mirror.as_ref(), landed.as_ref()).unwrap_or_else(|| {
                    let url = adapter.current_url();
                    match &landed {
                        Some(blob) => EntryStack::new(blob.landed_entry(adapter.segments_for(&url)))
                            .with_offset(blob.index),
                        None => EntryStack::new(adapter.entry_from_url(&url)),
                    }
                });
                (stack, PlatformOp::Replace)
            }
        };
        log::debug!(
            "opened with {} entries at index {} ({:?} authority)",
            stack.len(),
            stack.current_index(),
            authority
        );

        let mut coordinator = TransitionCoordinator {
            stack,
            adapter,
            mirror,
            authority,
            pipeline: Arc::new(self.pipeline),
            queue: PopQueue::new(),
            signals: self.signals,
            parked: None,
            next_id: 1,
            config: self.config,
        };
        coordinator.adapter.apply(&op, &coordinator.stack).await?;
        coordinator.write_mirror();
        Ok(coordinator)
    }
}

fn restore(
    authority: MirrorAuthority,
    mirror: &dyn MirrorStore,
    landed: Option<&EntryBlob>,
) -> Option<EntryStack> {
    let landed = landed?;
    if authority == MirrorAuthority::Store {
        match mirror.read().map(|record| record.map(|r| r.to_stack())) {
            Ok(Some(Ok(stack))) if stack.platform_position(&landed.key) == Some(landed.index) => {
                let offset = stack.offset();
                return EntryStack::from_entries(
                    stack.entries().to_vec(),
                    Some(landed.index - offset),
                    Direction::Stay,
                )
                .ok()
                .map(|stack| stack.with_offset(offset));
            }
            Ok(Some(Ok(_))) => log::warn!("mirror record does not match the landed entry; ignoring it"),
            Ok(Some(Err(err))) | Err(err) => log::warn!("mirror record unusable: {err}"),
            Ok(None) => {}
        }
    }
    if !landed.embeds_self() {
        return None;
    }
    let condensed = landed.stack.as_ref()?;
    EntryStack::from_condensed(condensed)
        .map_err(|err| log::warn!("landed blob holds an invalid stack: {err}"))
        .ok()
}

impl TransitionCoordinator {
    pub fn builder<P, M>(primitive: P, mirror: M) -> CoordinatorBuilder<P, M>
    where
        P: HistoryPrimitive + 'static,
        M: MirrorStore + 'static,
    {
        CoordinatorBuilder {
            primitive,
            mirror,
            codec: Arc::new(UrlPathCodec::new()),
            pipeline: TransitionPipeline::new(),
            config: CoordinatorConfig::default(),
            seed: None,
            signals: None,
        }
    }

    /// Runs a UI navigation through the pipeline.
    ///
    /// A blocked transition is reported with [`RequestStatus::Blocked`] and
    /// parked until [`confirm`](Self::confirm); a parked request is discarded
    /// by any later dispatch or pop.
    pub async fn dispatch(&mut self, nav: Navigation) -> Result<TransitionReport, NavError> {
        self.discard_parked();
        let req = self.ui_request(nav)?;
        self.run(req, 0).await
    }

    /// Resumes (`true`) or discards (`false`) the parked request.
    pub async fn confirm(&mut self, proceed: bool) -> Result<TransitionReport, NavError> {
        let mut req = self.parked.take().ok_or(NavError::NothingParked)?;
        if !proceed {
            log::debug!("blocked request {} cancelled", req.id);
            req.status = RequestStatus::Cancelled;
            return Ok(req.report());
        }
        let from = req.blocked_at.map_or(0, |index| index + 1);
        req.status = RequestStatus::Pending;
        self.run(req, from).await
    }

    pub async fn jump(&mut self, target: JumpTarget) -> Result<TransitionReport, NavError> {
        self.dispatch(Navigation::Jump(target)).await
    }

    pub async fn reset(
        &mut self,
        entries: Vec<Entry>,
        index: Option<usize>,
        direction: Option<Direction>,
    ) -> Result<TransitionReport, NavError> {
        self.dispatch(Navigation::Reset {
            entries,
            index,
            direction,
        })
        .await
    }

    /// Patches an entry in place without running the pipeline.
    ///
    /// The platform blob is rewritten only when the patched entry is current.
    pub async fn set(
        &mut self,
        patch: SetPatch,
        target: Option<&EntryKey>,
    ) -> Result<TransitionReport, NavError> {
        let snapshot = self.stack.clone();
        let index = self.stack.set(patch, target)?;
        if index == self.stack.current_index() {
            if let Err(err) = self.adapter.apply(&PlatformOp::Replace, &self.stack).await {
                self.stack = snapshot;
                return Err(err.into());
            }
        }
        self.write_mirror();
        Ok(TransitionReport {
            request: self.next_request_id(),
            kind: RequestKind::Set,
            origin: Origin::Ui,
            status: RequestStatus::Committed,
            entry: self.stack.get(index).cloned(),
            previous: snapshot.get(index).cloned(),
            redirects: 0,
            superseded_by: None,
            rewind_errors: Vec::new(),
            follow_up: None,
        })
    }

    pub fn entries(&self) -> &[Entry] {
        self.stack.entries()
    }

    pub fn current_index(&self) -> usize {
        self.stack.current_index()
    }

    pub fn direction(&self) -> Direction {
        self.stack.direction()
    }

    pub fn current(&self) -> &Entry {
        self.stack.current()
    }

    pub fn stack(&self) -> &EntryStack {
        &self.stack
    }

    pub fn parked(&self) -> Option<&Request> {
        self.parked.as_ref()
    }

    pub fn mode(&self) -> AdapterMode {
        self.adapter.mode()
    }

    pub fn authority(&self) -> MirrorAuthority {
        self.authority
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn adapter(&self) -> &PlatformHistoryAdapter {
        &self.adapter
    }

    fn next_request_id(&mut self) -> RequestId {
        let id = RequestId(self.next_id);
        self.next_id += 1;
        id
    }

    fn discard_parked(&mut self) {
        if let Some(parked) = self.parked.take() {
            log::debug!("discarding blocked request {}", parked.id);
        }
    }

    fn write_mirror(&mut self) {
        if self.authority != MirrorAuthority::Store {
            return;
        }
        if let Err(err) = self.mirror.write(&MirrorRecord::from_stack(&self.stack)) {
            log::warn!("mirror write failed; entry blobs are authoritative from now on: {err}");
            self.authority = MirrorAuthority::EntryBlob;
        }
    }

    /// Normalises a UI intent into a request, deciding push against the
    /// neighbour collapse and checking jump bounds up front.
    fn ui_request(&mut self, nav: Navigation) -> Result<Request, NavError> {
        let id = self.next_request_id();
        let req = match nav {
            Navigation::Push(target) => {
                let codec = self.adapter.codec();
                match self.stack.plan_push(&target.segments, codec) {
                    StackChange::Pushed => {
                        let entry = Entry::new(target.segments, target.state);
                        let mut req = Request::new(id, RequestKind::Push, Origin::Ui, entry, Plan::Push);
                        req.route = target.route;
                        req
                    }
                    StackChange::Jumped { delta } => {
                        log::debug!(
                            "push of {} matches the neighbour; jumping {delta:+}",
                            codec.encode(&target.segments)
                        );
                        let index = (self.stack.current_index() as i64 + delta) as usize;
                        let entry = self.stack.entries()[index].clone();
                        let mut req =
                            Request::new(id, RequestKind::Jump, Origin::Ui, entry, Plan::Jump { delta });
                        req.route = target.route;
                        req
                    }
                }
            }
            Navigation::Replace(target) => {
                let entry = Entry::new(target.segments, target.state);
                let mut req = Request::new(id, RequestKind::Replace, Origin::Ui, entry, Plan::Replace);
                req.route = target.route;
                req
            }
            Navigation::Jump(target) => {
                let delta = self.stack.can_jump(&target)?;
                let index = (self.stack.current_index() as i64 + delta) as usize;
                let entry = self.stack.entries()[index].clone();
                Request::new(id, RequestKind::Jump, Origin::Ui, entry, Plan::Jump { delta })
            }
            Navigation::Reset {
                entries,
                index,
                direction,
            } => {
                let preview = EntryStack::from_entries(entries.clone(), index, Direction::Stay)?;
                let entry = preview.current().clone();
                let plan = Plan::Reset {
                    entries,
                    index,
                    direction,
                };
                Request::new(id, RequestKind::Reset, Origin::Ui, entry, plan)
            }
        };
        Ok(req)
    }
}
