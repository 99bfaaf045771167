use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use medstock_core::{Aggregate, AggregateRoot, DomainError, Event, MedicineId, ReorderRequestId};

/// Reorder request status lifecycle.
///
/// `pending → approved → completed`, and `pending | approved → cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReorderStatus {
    Pending,
    Approved,
    Completed,
    Cancelled,
}

impl ReorderStatus {
    /// Pending or approved: counts against the one-active-request rule.
    pub fn is_active(self) -> bool {
        matches!(self, ReorderStatus::Pending | ReorderStatus::Approved)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReorderStatus::Pending => "pending",
            ReorderStatus::Approved => "approved",
            ReorderStatus::Completed => "completed",
            ReorderStatus::Cancelled => "cancelled",
        }
    }
}

impl core::fmt::Display for ReorderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a request was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// Stock recovered before anyone acted on the request.
    ShortageResolved,
    /// An administrator cancelled it.
    AdminOverride,
}

fn restored() -> bool {
    true
}

/// Aggregate root: ReorderRequest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderRequest {
    id: ReorderRequestId,
    medicine_id: MedicineId,
    quantity: u32,
    status: ReorderStatus,
    cancel_reason: Option<CancelReason>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: u64,
    #[serde(skip_serializing, default = "restored")]
    created: bool,
}

impl ReorderRequest {
    /// Create an empty, not-yet-opened aggregate instance.
    pub fn empty(id: ReorderRequestId) -> Self {
        Self {
            id,
            medicine_id: MedicineId::new(""),
            quantity: 0,
            status: ReorderStatus::Pending,
            cancel_reason: None,
            created_at: DateTime::<Utc>::MIN_UTC,
            updated_at: DateTime::<Utc>::MIN_UTC,
            version: 0,
            created: false,
        }
    }

    /// Open a new pending request in one step.
    pub fn open(
        id: ReorderRequestId,
        medicine_id: MedicineId,
        quantity: u32,
        occurred_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let mut request = Self::empty(id);
        request.execute(&ReorderCommand::Open(OpenRequest {
            request_id: id,
            medicine_id,
            quantity,
            occurred_at,
        }))?;
        Ok(request)
    }

    pub fn id_typed(&self) -> ReorderRequestId {
        self.id
    }

    pub fn medicine_id(&self) -> &MedicineId {
        &self.medicine_id
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn status(&self) -> ReorderStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.created && self.status.is_active()
    }

    pub fn cancel_reason(&self) -> Option<CancelReason> {
        self.cancel_reason
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// The mutable fields a store needs to persist after a transition.
    pub fn to_update(&self) -> RequestUpdate {
        RequestUpdate {
            status: self.status,
            cancel_reason: self.cancel_reason,
            updated_at: self.updated_at,
            version: self.version,
        }
    }

    /// Overwrite the mutable fields from a persisted update.
    pub fn apply_update(&mut self, update: &RequestUpdate) {
        self.status = update.status;
        self.cancel_reason = update.cancel_reason;
        self.updated_at = update.updated_at;
        self.version = update.version;
    }
}

impl AggregateRoot for ReorderRequest {
    type Id = ReorderRequestId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Field-level update handed to the request store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestUpdate {
    pub status: ReorderStatus,
    pub cancel_reason: Option<CancelReason>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

/// Command: OpenRequest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenRequest {
    pub request_id: ReorderRequestId,
    pub medicine_id: MedicineId,
    pub quantity: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ApproveRequest (only from pending).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveRequest {
    pub request_id: ReorderRequestId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CompleteRequest (only from approved).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteRequest {
    pub request_id: ReorderRequestId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelRequest (from pending or approved).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelRequest {
    pub request_id: ReorderRequestId,
    pub reason: CancelReason,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReorderCommand {
    Open(OpenRequest),
    Approve(ApproveRequest),
    Complete(CompleteRequest),
    Cancel(CancelRequest),
}

impl ReorderCommand {
    pub fn approve(request_id: ReorderRequestId, occurred_at: DateTime<Utc>) -> Self {
        Self::Approve(ApproveRequest {
            request_id,
            occurred_at,
        })
    }

    pub fn complete(request_id: ReorderRequestId, occurred_at: DateTime<Utc>) -> Self {
        Self::Complete(CompleteRequest {
            request_id,
            occurred_at,
        })
    }

    pub fn cancel(
        request_id: ReorderRequestId,
        reason: CancelReason,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self::Cancel(CancelRequest {
            request_id,
            reason,
            occurred_at,
        })
    }
}

/// Event: RequestOpened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestOpened {
    pub request_id: ReorderRequestId,
    pub medicine_id: MedicineId,
    pub quantity: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RequestApproved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestApproved {
    pub request_id: ReorderRequestId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RequestCompleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestCompleted {
    pub request_id: ReorderRequestId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RequestCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestCancelled {
    pub request_id: ReorderRequestId,
    pub reason: CancelReason,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReorderEvent {
    RequestOpened(RequestOpened),
    RequestApproved(RequestApproved),
    RequestCompleted(RequestCompleted),
    RequestCancelled(RequestCancelled),
}

impl Event for ReorderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ReorderEvent::RequestOpened(_) => "reorder.request.opened",
            ReorderEvent::RequestApproved(_) => "reorder.request.approved",
            ReorderEvent::RequestCompleted(_) => "reorder.request.completed",
            ReorderEvent::RequestCancelled(_) => "reorder.request.cancelled",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ReorderEvent::RequestOpened(e) => e.occurred_at,
            ReorderEvent::RequestApproved(e) => e.occurred_at,
            ReorderEvent::RequestCompleted(e) => e.occurred_at,
            ReorderEvent::RequestCancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for ReorderRequest {
    type Command = ReorderCommand;
    type Event = ReorderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ReorderEvent::RequestOpened(e) => {
                self.id = e.request_id;
                self.medicine_id = e.medicine_id.clone();
                self.quantity = e.quantity;
                self.status = ReorderStatus::Pending;
                self.cancel_reason = None;
                self.created_at = e.occurred_at;
                self.updated_at = e.occurred_at;
                self.created = true;
            }
            ReorderEvent::RequestApproved(e) => {
                self.status = ReorderStatus::Approved;
                self.updated_at = e.occurred_at;
            }
            ReorderEvent::RequestCompleted(e) => {
                self.status = ReorderStatus::Completed;
                self.updated_at = e.occurred_at;
            }
            ReorderEvent::RequestCancelled(e) => {
                self.status = ReorderStatus::Cancelled;
                self.cancel_reason = Some(e.reason);
                self.updated_at = e.occurred_at;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ReorderCommand::Open(cmd) => self.handle_open(cmd),
            ReorderCommand::Approve(cmd) => self.handle_approve(cmd),
            ReorderCommand::Complete(cmd) => self.handle_complete(cmd),
            ReorderCommand::Cancel(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl ReorderRequest {
    fn ensure_request_id(&self, request_id: ReorderRequestId) -> Result<(), DomainError> {
        if self.id != request_id {
            return Err(DomainError::validation("request_id mismatch"));
        }
        Ok(())
    }

    /// Shared guard for every transition out of an existing request.
    fn ensure_mutable(&self, request_id: ReorderRequestId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("reorder request {request_id}")));
        }
        self.ensure_request_id(request_id)?;
        if self.status.is_terminal() {
            return Err(DomainError::already_terminal(self.status.as_str()));
        }
        Ok(())
    }

    fn handle_open(&self, cmd: &OpenRequest) -> Result<Vec<ReorderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("reorder request already exists"));
        }
        self.ensure_request_id(cmd.request_id)?;
        if cmd.medicine_id.is_blank() {
            return Err(DomainError::validation("medicine id cannot be empty"));
        }
        if cmd.quantity == 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }

        Ok(vec![ReorderEvent::RequestOpened(RequestOpened {
            request_id: cmd.request_id,
            medicine_id: cmd.medicine_id.clone(),
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_approve(&self, cmd: &ApproveRequest) -> Result<Vec<ReorderEvent>, DomainError> {
        self.ensure_mutable(cmd.request_id)?;

        if self.status != ReorderStatus::Pending {
            return Err(DomainError::invalid_transition(
                "approve",
                self.status.as_str(),
            ));
        }

        Ok(vec![ReorderEvent::RequestApproved(RequestApproved {
            request_id: cmd.request_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_complete(&self, cmd: &CompleteRequest) -> Result<Vec<ReorderEvent>, DomainError> {
        self.ensure_mutable(cmd.request_id)?;

        // Invariant: cannot complete before approval.
        if self.status != ReorderStatus::Approved {
            return Err(DomainError::invalid_transition(
                "complete",
                self.status.as_str(),
            ));
        }

        Ok(vec![ReorderEvent::RequestCompleted(RequestCompleted {
            request_id: cmd.request_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelRequest) -> Result<Vec<ReorderEvent>, DomainError> {
        self.ensure_mutable(cmd.request_id)?;

        Ok(vec![ReorderEvent::RequestCancelled(RequestCancelled {
            request_id: cmd.request_id,
            reason: cmd.reason,
            occurred_at: cmd.occurred_at,
        })])
    }
}
