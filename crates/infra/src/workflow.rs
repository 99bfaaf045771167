//! Reorder workflow orchestration.
//!
//! Loads a request, lets the pure aggregate decide, then persists the new
//! state. Every mutation for one medicine happens under that medicine's keyed
//! lock, so check-then-act sequences are linearized per medicine while
//! different medicines proceed in parallel.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info};

use medstock_core::{Aggregate, AggregateRoot, Event, ExpectedVersion, MedicineId, ReorderRequestId};
use medstock_reorder::{
    CancelReason, OpenRequest, ReorderCommand, ReorderEvent, ReorderRequest, ReorderStatus,
};

use crate::deadline::with_deadline;
use crate::error::EngineError;
use crate::keyed_lock::KeyedLocks;
use crate::request_store::ReorderRequestStore;

/// Result of [`ReorderWorkflow::request_reorder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReorderOutcome {
    pub request: ReorderRequest,
    /// `false` when an active request already existed and was returned as-is.
    pub created: bool,
}

#[derive(Debug, Clone, Copy)]
enum Transition {
    Approve,
    Complete,
    Cancel(CancelReason),
}

impl Transition {
    fn action(self) -> &'static str {
        match self {
            Transition::Approve => "approve",
            Transition::Complete => "complete",
            Transition::Cancel(_) => "cancel",
        }
    }

    fn command(self, id: ReorderRequestId) -> ReorderCommand {
        let now = Utc::now();
        match self {
            Transition::Approve => ReorderCommand::approve(id, now),
            Transition::Complete => ReorderCommand::complete(id, now),
            Transition::Cancel(reason) => ReorderCommand::cancel(id, reason, now),
        }
    }
}

#[derive(Clone)]
pub struct ReorderWorkflow {
    store: Arc<dyn ReorderRequestStore>,
    locks: KeyedLocks<MedicineId>,
    action_timeout: Duration,
}

impl ReorderWorkflow {
    pub fn new(store: Arc<dyn ReorderRequestStore>, action_timeout: Duration) -> Self {
        Self {
            store,
            locks: KeyedLocks::new(),
            action_timeout,
        }
    }

    /// Ensure `medicine_id` has an active request.
    ///
    /// Idempotent: when a pending or approved request exists it is returned
    /// unchanged and nothing is written.
    pub async fn request_reorder(
        &self,
        medicine_id: &MedicineId,
        quantity: u32,
    ) -> Result<ReorderOutcome, EngineError> {
        with_deadline("request_reorder", self.action_timeout, async {
            let _guard = self.locks.lock(medicine_id.clone()).await;

            if let Some(existing) = self.store.get_active_request(medicine_id).await? {
                debug!(
                    medicine_id = %medicine_id,
                    request_id = %existing.id_typed(),
                    status = %existing.status(),
                    "active reorder request exists; skipping"
                );
                return Ok(ReorderOutcome {
                    request: existing,
                    created: false,
                });
            }

            let id = ReorderRequestId::new();
            let mut request = ReorderRequest::empty(id);
            let events = request.execute(&ReorderCommand::Open(OpenRequest {
                request_id: id,
                medicine_id: medicine_id.clone(),
                quantity,
                occurred_at: Utc::now(),
            }))?;

            let stored = self.store.create_request(request).await?;
            log_events(&stored, &events);

            Ok(ReorderOutcome {
                request: stored,
                created: true,
            })
        })
        .await
    }

    pub async fn approve(&self, id: ReorderRequestId) -> Result<ReorderRequest, EngineError> {
        self.transition(id, Transition::Approve).await
    }

    pub async fn complete(&self, id: ReorderRequestId) -> Result<ReorderRequest, EngineError> {
        self.transition(id, Transition::Complete).await
    }

    pub async fn cancel(
        &self,
        id: ReorderRequestId,
        reason: CancelReason,
    ) -> Result<ReorderRequest, EngineError> {
        self.transition(id, Transition::Cancel(reason)).await
    }

    /// Cancel the medicine's request if, and only if, it is still pending.
    ///
    /// Approved requests have been acted on by a person and are left alone.
    /// Returns the cancelled request, or `None` when there was nothing to do.
    pub async fn withdraw_pending(
        &self,
        medicine_id: &MedicineId,
    ) -> Result<Option<ReorderRequest>, EngineError> {
        with_deadline("withdraw_pending", self.action_timeout, async {
            let _guard = self.locks.lock(medicine_id.clone()).await;

            let Some(mut request) = self.store.get_active_request(medicine_id).await? else {
                return Ok(None);
            };
            if request.status() != ReorderStatus::Pending {
                return Ok(None);
            }

            let stored = self
                .persist(&mut request, Transition::Cancel(CancelReason::ShortageResolved))
                .await?;
            Ok(Some(stored))
        })
        .await
    }

    pub async fn get_request(&self, id: ReorderRequestId) -> Result<ReorderRequest, EngineError> {
        self.store
            .get_request(id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("reorder request {id}")))
    }

    pub async fn active_request(
        &self,
        medicine_id: &MedicineId,
    ) -> Result<Option<ReorderRequest>, EngineError> {
        Ok(self.store.get_active_request(medicine_id).await?)
    }

    /// Every request raised for `medicine_id`, oldest first.
    pub async fn requests_for(
        &self,
        medicine_id: &MedicineId,
    ) -> Result<Vec<ReorderRequest>, EngineError> {
        Ok(self.store.list_for_medicine(medicine_id).await?)
    }

    async fn transition(
        &self,
        id: ReorderRequestId,
        transition: Transition,
    ) -> Result<ReorderRequest, EngineError> {
        with_deadline(transition.action(), self.action_timeout, async {
            // The medicine id never changes, so an unlocked read is enough to
            // pick the lock; the decision is made on a fresh read under it.
            let medicine_id = self.get_request(id).await?.medicine_id().clone();
            let _guard = self.locks.lock(medicine_id).await;

            let mut request = self.get_request(id).await?;
            self.persist(&mut request, transition).await
        })
        .await
    }

    /// Decide and write one transition. Caller holds the medicine lock.
    async fn persist(
        &self,
        request: &mut ReorderRequest,
        transition: Transition,
    ) -> Result<ReorderRequest, EngineError> {
        let id = request.id_typed();
        let expected = ExpectedVersion::Exact(request.version());
        let events = request.execute(&transition.command(id))?;

        let stored = self
            .store
            .update_request(id, &request.to_update(), expected)
            .await?;
        log_events(&stored, &events);
        Ok(stored)
    }
}

fn log_events(request: &ReorderRequest, events: &[ReorderEvent]) {
    for event in events {
        info!(
            request_id = %request.id_typed(),
            medicine_id = %request.medicine_id(),
            quantity = request.quantity(),
            status = %request.status(),
            event_type = event.event_type(),
            "reorder request updated"
        );
    }
}
