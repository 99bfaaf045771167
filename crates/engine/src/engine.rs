use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{info, warn};

use medstock_core::{MedicineId, ReorderRequestId, SupplierId};
use medstock_infra::deadline::with_deadline;
use medstock_infra::notify::{
    NotificationDispatcher, NotificationHistory, SupplierDirectory, SupplierOutcome,
    SupplierTransport,
};
use medstock_infra::request_store::ReorderRequestStore;
use medstock_infra::snapshots::StockSnapshotProvider;
use medstock_infra::{
    CycleError, CycleReport, CycleRunner, EngineConfig, EngineError, ReorderOutcome,
    ReorderWorkflow,
};
use medstock_inventory::{Evaluation, MedicineSnapshot, evaluate};
use medstock_reorder::{CancelReason, ReorderRequest};
use medstock_suppliers::{NotificationRecord, NotificationType, NotifiedMedicine, normalize_specialty};

/// Every external boundary the engine talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub snapshots: Arc<dyn StockSnapshotProvider>,
    pub requests: Arc<dyn ReorderRequestStore>,
    pub suppliers: Arc<dyn SupplierDirectory>,
    pub transport: Arc<dyn SupplierTransport>,
    pub history: Arc<dyn NotificationHistory>,
}

/// Result of [`ReorderEngine::approve_and_notify`].
///
/// The approval stands even when notifying suppliers fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalOutcome {
    pub request: ReorderRequest,
    pub notifications: Result<Vec<SupplierOutcome>, EngineError>,
}

#[derive(Clone)]
pub struct ReorderEngine {
    snapshots: Arc<dyn StockSnapshotProvider>,
    workflow: ReorderWorkflow,
    dispatcher: NotificationDispatcher,
    config: EngineConfig,
}

impl ReorderEngine {
    pub fn new(collaborators: Collaborators, config: EngineConfig) -> Self {
        let workflow = ReorderWorkflow::new(collaborators.requests, config.action_timeout);
        let dispatcher = NotificationDispatcher::new(
            collaborators.suppliers,
            collaborators.transport,
            collaborators.history,
            config.notify_timeout,
        );
        Self {
            snapshots: collaborators.snapshots,
            workflow,
            dispatcher,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Read snapshots, evaluate them, and reconcile reorder requests.
    ///
    /// The cycle deadline covers the read and the evaluation, which write
    /// nothing; a cycle that fails there leaves the store untouched. Once
    /// reconciliation starts, every write runs to completion under the action
    /// deadline and lands in the report, either counted or as a per-medicine
    /// error.
    pub async fn run_evaluation_cycle(&self) -> Result<CycleReport, EngineError> {
        let (snapshot_count, evaluation) =
            with_deadline("evaluation_cycle", self.config.cycle_timeout, async {
                let snapshots = self.snapshots.get_snapshots().await?;
                Ok::<_, EngineError>((snapshots.len(), evaluate(&snapshots)))
            })
            .await?;

        Ok(self.reconcile(snapshot_count, evaluation).await)
    }

    async fn reconcile(&self, snapshot_count: usize, evaluation: Evaluation) -> CycleReport {
        let mut report = CycleReport::default();

        for rejected in evaluation.rejected {
            warn!(
                medicine_id = %rejected.medicine_id,
                error = %rejected.error,
                "snapshot rejected"
            );
            report.errors.push(CycleError {
                medicine_id: rejected.medicine_id,
                error: rejected.error.into(),
            });
        }

        let reorders = join_all(evaluation.shortages.iter().map(|shortage| async move {
            let outcome = self
                .workflow
                .request_reorder(&shortage.medicine_id, shortage.suggested_quantity)
                .await;
            (shortage, outcome)
        }))
        .await;

        for (shortage, outcome) in reorders {
            match outcome {
                Ok(ReorderOutcome { created: true, .. }) => report.created += 1,
                Ok(ReorderOutcome { created: false, .. }) => report.skipped += 1,
                Err(e) => {
                    warn!(
                        medicine_id = %shortage.medicine_id,
                        severity = ?shortage.severity,
                        error = %e,
                        "reorder request failed"
                    );
                    report.errors.push(CycleError {
                        medicine_id: shortage.medicine_id.clone(),
                        error: e,
                    });
                }
            }
        }

        if self.config.auto_cancel_resolved {
            let withdrawals = join_all(evaluation.normal.iter().map(|medicine_id| async move {
                (medicine_id, self.workflow.withdraw_pending(medicine_id).await)
            }))
            .await;

            for (medicine_id, outcome) in withdrawals {
                match outcome {
                    Ok(Some(_)) => report.cancelled += 1,
                    Ok(None) => {}
                    Err(e) => {
                        warn!(medicine_id = %medicine_id, error = %e, "withdrawing pending request failed");
                        report.errors.push(CycleError {
                            medicine_id: medicine_id.clone(),
                            error: e,
                        });
                    }
                }
            }
        }

        info!(
            snapshots = snapshot_count,
            shortages = evaluation.shortages.len(),
            created = report.created,
            skipped = report.skipped,
            cancelled = report.cancelled,
            errors = report.errors.len(),
            "evaluation cycle complete"
        );
        report
    }

    /// Manually ensure a medicine has an active reorder request.
    pub async fn request_reorder(
        &self,
        medicine_id: &MedicineId,
        quantity: u32,
    ) -> Result<ReorderOutcome, EngineError> {
        self.workflow.request_reorder(medicine_id, quantity).await
    }

    pub async fn approve_request(&self, id: ReorderRequestId) -> Result<ReorderRequest, EngineError> {
        self.workflow.approve(id).await
    }

    pub async fn complete_request(&self, id: ReorderRequestId) -> Result<ReorderRequest, EngineError> {
        self.workflow.complete(id).await
    }

    /// Administrative cancellation.
    pub async fn cancel_request(&self, id: ReorderRequestId) -> Result<ReorderRequest, EngineError> {
        self.workflow.cancel(id, CancelReason::AdminOverride).await
    }

    pub async fn get_request(&self, id: ReorderRequestId) -> Result<ReorderRequest, EngineError> {
        self.workflow.get_request(id).await
    }

    pub async fn requests_for(
        &self,
        medicine_id: &MedicineId,
    ) -> Result<Vec<ReorderRequest>, EngineError> {
        self.workflow.requests_for(medicine_id).await
    }

    /// Approve a request, then send a `reorder` notification for its medicine
    /// to every matching supplier.
    ///
    /// An approval failure is returned as an error. A notification failure is
    /// reported inside the outcome, since the approval already took effect.
    pub async fn approve_and_notify(
        &self,
        id: ReorderRequestId,
    ) -> Result<ApprovalOutcome, EngineError> {
        let request = self.workflow.approve(id).await?;

        let notifications = async {
            let resolved = self
                .resolve_medicines(std::slice::from_ref(request.medicine_id()))
                .await?;
            let (mut lines, filter) = split_resolved(resolved);
            for line in &mut lines {
                line.requested_quantity = request.quantity();
            }
            self.dispatcher
                .notify_all(&lines, NotificationType::Reorder, filter.as_ref())
                .await
        }
        .await;

        if let Err(e) = &notifications {
            warn!(request_id = %id, error = %e, "approved, but supplier notification failed");
        }

        Ok(ApprovalOutcome {
            request,
            notifications,
        })
    }

    pub async fn notify_supplier(
        &self,
        supplier_id: &SupplierId,
        medicine_ids: &[MedicineId],
        kind: NotificationType,
    ) -> Result<NotificationRecord, EngineError> {
        let supplier = self
            .dispatcher
            .directory()
            .get_supplier(supplier_id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("supplier {supplier_id}")))?;
        if !supplier.is_active {
            return Err(EngineError::InactiveSupplier(supplier.id));
        }
        let (lines, _) = split_resolved(self.resolve_medicines(medicine_ids).await?);

        self.dispatcher.notify(&supplier, &lines, kind).await
    }

    /// Notify every active supplier whose specialties cover the medicines'
    /// categories (all active suppliers when no medicine has a category).
    pub async fn notify_all_suppliers(
        &self,
        medicine_ids: &[MedicineId],
        kind: NotificationType,
    ) -> Result<Vec<SupplierOutcome>, EngineError> {
        let (lines, filter) = split_resolved(self.resolve_medicines(medicine_ids).await?);

        self.dispatcher.notify_all(&lines, kind, filter.as_ref()).await
    }

    pub async fn get_notification_history(
        &self,
        supplier_id: &SupplierId,
    ) -> Result<Vec<NotificationRecord>, EngineError> {
        self.dispatcher.history_for(supplier_id).await
    }

    /// Look medicines up in a fresh snapshot read, keeping caller order and
    /// dropping repeated ids. Each line carries its category alongside.
    async fn resolve_medicines(
        &self,
        medicine_ids: &[MedicineId],
    ) -> Result<Vec<(NotifiedMedicine, Option<String>)>, EngineError> {
        if medicine_ids.is_empty() {
            return Err(EngineError::validation("at least one medicine id is required"));
        }

        let snapshots = self.snapshots.get_snapshots().await?;
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(medicine_ids.len());

        for id in medicine_ids {
            if !seen.insert(id) {
                continue;
            }
            let snapshot = snapshots
                .iter()
                .find(|s| &s.medicine_id == id)
                .ok_or_else(|| EngineError::not_found(format!("medicine {id}")))?;
            out.push((notified_line(snapshot)?, snapshot.category.clone()));
        }

        Ok(out)
    }
}

fn notified_line(snapshot: &MedicineSnapshot) -> Result<NotifiedMedicine, EngineError> {
    snapshot.validate()?;
    let stock = u64::try_from(snapshot.stock)
        .map_err(|_| EngineError::validation(format!("medicine {}: bad stock", snapshot.medicine_id)))?;
    let requested_quantity = u32::try_from(snapshot.reorder_quantity).map_err(|_| {
        EngineError::validation(format!("medicine {}: bad reorder quantity", snapshot.medicine_id))
    })?;

    Ok(NotifiedMedicine {
        medicine_id: snapshot.medicine_id.clone(),
        name: snapshot.name.clone(),
        stock,
        requested_quantity,
    })
}

fn split_resolved(
    resolved: Vec<(NotifiedMedicine, Option<String>)>,
) -> (Vec<NotifiedMedicine>, Option<BTreeSet<String>>) {
    let (lines, categories): (Vec<_>, Vec<_>) = resolved.into_iter().unzip();
    (lines, specialty_filter(&categories))
}

/// Normalized categories of the given medicines, or `None` when none has one.
fn specialty_filter(categories: &[Option<String>]) -> Option<BTreeSet<String>> {
    let filter: BTreeSet<String> = categories
        .iter()
        .flatten()
        .map(|c| normalize_specialty(c))
        .filter(|c| !c.is_empty())
        .collect();
    (!filter.is_empty()).then_some(filter)
}

#[async_trait]
impl CycleRunner for ReorderEngine {
    async fn run_cycle(&self) -> Result<CycleReport, EngineError> {
        self.run_evaluation_cycle().await
    }
}
