use std::sync::Arc;

use futures::future::BoxFuture;
use waypoint_platform::{AdapterError, PlatformOp, Reconciliation};
use waypoint_types::{EntryStack, JumpTarget};

use super::TransitionCoordinator;
use super::pop::recv_or_pending;
use crate::pipeline::Rewound;
use crate::request::Plan;
use crate::{
    InFlight, NavError, Navigation, Origin, Outcome, Phase, Request, RequestKind, RequestStatus,
    StageError, Target, TransitionReport,
};

/// How the approach phase ended.
enum Approached {
    Commit,
    Blocked,
    Redirect(Target),
    Failed(StageError),
    /// A pop signal took over before the commit.
    Superseded(waypoint_platform::PopSignal),
}

impl TransitionCoordinator {
    pub(super) fn run(&mut self, req: Request, from: usize) -> BoxFuture<'_, Result<TransitionReport, NavError>> {
        Box::pin(self.run_request(req, from))
    }

    async fn run_request(&mut self, mut req: Request, mut from: usize) -> Result<TransitionReport, NavError> {
        loop {
            let flight = self.in_flight(&req);
            self.queue.begin(flight);
            let approached = self.drive_approach(&mut req, from).await;
            if !matches!(approached, Approached::Commit) {
                self.queue.finish();
            }
            match approached {
                Approached::Commit => return self.commit_and_rewind(req).await,
                Approached::Blocked => {
                    req.status = RequestStatus::Blocked;
                    self.restore_platform(&mut req);
                    log::debug!("request {} blocked at stage {:?}", req.id, req.blocked_at);
                    let report = req.report();
                    self.parked = Some(req);
                    return Ok(report);
                }
                Approached::Redirect(target) => {
                    req = self.redirected(req, target)?;
                    from = 0;
                }
                Approached::Failed(source) => {
                    req.status = RequestStatus::Failed;
                    self.restore_platform(&mut req);
                    let stage = req.failed_stage.take().unwrap_or_else(|| "unknown".to_owned());
                    log::warn!("request {} failed in stage '{stage}': {source}", req.id);
                    return Err(NavError::StageFailure {
                        request: req.id,
                        stage,
                        source,
                    });
                }
                Approached::Superseded(signal) => {
                    req.status = RequestStatus::Superseded;
                    let follow_up = self.handle_pop(signal).await?;
                    req.superseded_by = follow_up.as_ref().map(|report| report.request);
                    log::debug!("request {} superseded by {:?}", req.id, req.superseded_by);
                    let mut report = req.report();
                    if let Some(follow_up) = follow_up {
                        report.append(follow_up);
                    }
                    return Ok(report);
                }
            }
        }
    }

    fn in_flight(&self, req: &Request) -> InFlight {
        // positions are platform positions, as recorded in entry blobs
        let (expected_index, expected_key) = match (req.origin, &req.plan) {
            (
                Origin::Platform,
                Plan::Pop {
                    landing: Reconciliation::Diverged { stack },
                    ..
                },
            ) => (stack.offset() + stack.current_index(), req.target.key.clone()),
            (Origin::Platform, _) => (self.stack.offset() + req.target.index, req.target.key.clone()),
            (Origin::Ui, _) => (
                self.stack.offset() + self.stack.current_index(),
                self.stack.current().key.clone(),
            ),
        };
        InFlight {
            id: req.id,
            origin: req.origin,
            phase: Phase::Approach,
            expected_index,
            expected_key,
        }
    }

    /// Runs the approach stages while still listening for pop signals.
    async fn drive_approach(&mut self, req: &mut Request, from: usize) -> Approached {
        let pipeline = Arc::clone(&self.pipeline);
        let approach = pipeline.approach(req, from);
        tokio::pin!(approach);
        loop {
            tokio::select! {
                biased;
                Some(signal) = recv_or_pending(&mut self.signals) => {
                    if let Some(signal) = self.signal_in_flight(signal) {
                        return Approached::Superseded(signal);
                    }
                }
                result = &mut approach => {
                    return match result {
                        Ok(Outcome::Continue) => Approached::Commit,
                        Ok(Outcome::Blocked) => Approached::Blocked,
                        Ok(Outcome::Redirect(target)) => Approached::Redirect(target),
                        Err(err) => Approached::Failed(err),
                    };
                }
            }
        }
    }

    async fn drive_rewind(&mut self, req: &mut Request) -> Rewound {
        let pipeline = Arc::clone(&self.pipeline);
        let rewind = pipeline.rewind(req);
        tokio::pin!(rewind);
        loop {
            tokio::select! {
                biased;
                Some(signal) = recv_or_pending(&mut self.signals) => {
                    if self.signal_in_flight(signal).is_some() {
                        log::warn!("pop signal cannot supersede a committed request");
                    }
                }
                rewound = &mut rewind => return rewound,
            }
        }
    }

    /// Marks `req` redirected and builds its successor. A push stays a push,
    /// anything else becomes a replace; ambient values carry over.
    fn redirected(&mut self, mut req: Request, target: Target) -> Result<Request, NavError> {
        self.restore_platform(&mut req);
        let limit = self.config.max_redirects;
        if req.redirects >= limit {
            req.status = RequestStatus::Failed;
            log::warn!("request {} exceeded {limit} redirects", req.id);
            return Err(NavError::RedirectLoop {
                request: req.id,
                limit,
            });
        }
        req.status = RequestStatus::Redirected;
        log::debug!("request {} redirected to {}", req.id, target.segments.path);
        self.successor(&req, target)
    }

    fn successor(&mut self, req: &Request, target: Target) -> Result<Request, NavError> {
        let nav = if req.kind == RequestKind::Push {
            Navigation::Push(target)
        } else {
            Navigation::Replace(target)
        };
        let mut next = self.ui_request(nav)?;
        next.ambient = req.ambient.clone();
        next.redirects = req.redirects + 1;
        next.redirected_from = Some(req.id);
        Ok(next)
    }

    async fn commit_and_rewind(&mut self, mut req: Request) -> Result<TransitionReport, NavError> {
        let previous = self.stack.current().clone();
        if let Err(err) = self.commit(&req).await {
            self.queue.finish();
            req.status = RequestStatus::Failed;
            self.restore_platform(&mut req);
            return Err(err);
        }
        req.status = RequestStatus::Committed;
        req.previous = Some(previous);
        req.committed = Some(self.stack.current().clone());
        self.queue.enter_rewind();

        let rewound = self.drive_rewind(&mut req).await;
        let deferred = self.queue.finish();
        let mut report = req.report();
        report.rewind_errors = rewound.errors;

        if let Some(target) = rewound.redirect {
            let limit = self.config.max_redirects;
            if req.redirects >= limit {
                return Err(NavError::RedirectLoop {
                    request: req.id,
                    limit,
                });
            }
            log::debug!("request {} continues to {} after commit", req.id, target.segments.path);
            let next = self.successor(&req, target)?;
            report.append(self.run(next, 0).await?);
        }
        if let Some(signal) = deferred {
            if let Some(follow_up) = self.handle_pop(signal).await? {
                report.append(follow_up);
            }
        }
        Ok(report)
    }

    /// Mutates the stack, applies the platform operations and writes the
    /// mirror.
    ///
    /// When the platform rejects an operation the stack is rolled back and
    /// moves made by earlier operations are undone. A rewrite that failed
    /// half way cannot be undone; the stack is cut down to what the platform
    /// kept instead.
    async fn commit(&mut self, req: &Request) -> Result<(), NavError> {
        let snapshot = self.stack.clone();
        let ops = match self.mutate(req) {
            Ok(ops) => ops,
            Err(err) => {
                self.stack = snapshot;
                return Err(err);
            }
        };
        let mut moved = 0;
        for op in &ops {
            match self.adapter.apply(op, &self.stack).await {
                Ok(confirmed) => {
                    if !confirmed {
                        log::warn!("platform did not confirm {} for request {}", op.name(), req.id);
                    }
                    if let PlatformOp::Move(delta) = op {
                        moved += delta;
                    }
                }
                Err(AdapterError::Partial { written, source }) => {
                    log::warn!(
                        "platform rejected {} for request {} after {written} entries: {source}",
                        op.name(),
                        req.id
                    );
                    let kept = written - 1;
                    let landed = self.stack.entries()[kept].clone();
                    self.stack.truncate_onto(kept, landed);
                    self.write_mirror();
                    return Err(AdapterError::Partial { written, source }.into());
                }
                Err(err) => {
                    log::warn!("platform rejected {} for request {}: {err}", op.name(), req.id);
                    self.stack = snapshot;
                    if moved != 0 {
                        let key = self.stack.current().key.clone();
                        if let Err(undo) = self.adapter.compensate(-moved, key) {
                            log::warn!("could not move the platform back for request {}: {undo}", req.id);
                        }
                    }
                    return Err(err.into());
                }
            }
        }
        self.write_mirror();
        log::debug!(
            "committed request {} ({:?}); index {} of {}",
            req.id,
            req.kind,
            self.stack.current_index(),
            self.stack.len()
        );
        Ok(())
    }

    fn mutate(&mut self, req: &Request) -> Result<Vec<PlatformOp>, NavError> {
        let ops = match &req.plan {
            Plan::Push => {
                self.stack.push_unchecked(req.target.clone())?;
                vec![PlatformOp::Push]
            }
            Plan::Replace => {
                self.stack.replace(req.target.clone())?;
                vec![PlatformOp::Replace]
            }
            Plan::Jump { delta } => {
                self.stack.jump(&JumpTarget::Delta(*delta))?;
                vec![PlatformOp::Move(*delta)]
            }
            Plan::Reset {
                entries,
                index,
                direction,
            } => {
                let from_index = self.stack.current_index();
                let from_key = self.stack.current().key.clone();
                let from_first = self.stack.entries()[0].key.clone();
                self.stack.reset(entries.clone(), *index, *direction)?;
                vec![PlatformOp::Rewrite {
                    from_index,
                    from_key,
                    from_first,
                }]
            }
            Plan::Pop {
                landing,
                platform_delta,
                restored,
            } => {
                let mut ops = Vec::new();
                // the platform was moved back while blocked; move it forward again
                let replay = platform_delta.filter(|_| *restored);
                if let Some(delta) = replay {
                    ops.push(PlatformOp::Move(delta));
                }
                match landing {
                    Reconciliation::Aligned { index } => {
                        let delta = *index as i64 - self.stack.current_index() as i64;
                        self.stack.jump(&JumpTarget::Delta(delta))?;
                        if replay.is_none() && self.config.embed_stack_in_blob {
                            ops.push(PlatformOp::Replace);
                        }
                    }
                    Reconciliation::Diverged { stack } => {
                        self.stack = stack.clone();
                        ops.push(PlatformOp::Replace);
                    }
                    Reconciliation::Foreign { entry } => {
                        self.stack = EntryStack::new(entry.clone());
                        ops.push(PlatformOp::Replace);
                    }
                }
                ops
            }
        };
        Ok(ops)
    }

    /// Moves the platform back to the committed entry after a pop that did
    /// not commit.
    fn restore_platform(&mut self, req: &mut Request) {
        let Plan::Pop {
            platform_delta: Some(delta),
            restored,
            ..
        } = &mut req.plan
        else {
            return;
        };
        if *restored || *delta == 0 {
            return;
        }
        let key = self.stack.current().key.clone();
        match self.adapter.compensate(-*delta, key) {
            Ok(()) => *restored = true,
            Err(err) => log::warn!("could not restore platform position for {}: {err}", req.id),
        }
    }
}
