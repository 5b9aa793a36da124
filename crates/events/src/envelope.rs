use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use firelancer_core::{AggregateId, RequestContext, TenantId};

/// Envelope for a published domain event.
///
/// Carries the [`RequestContext`] the change happened in so subscribers can
/// act on behalf of the same tenant, and the aggregate version after the
/// change (`sequence_number`) so they can discard stale duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    ctx: RequestContext,

    aggregate_id: AggregateId,
    aggregate_type: String,

    /// Aggregate version after the change.
    sequence_number: u64,
    published_at: DateTime<Utc>,

    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        ctx: RequestContext,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        sequence_number: u64,
        payload: E,
    ) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            ctx,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            sequence_number,
            published_at: Utc::now(),
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn ctx(&self) -> &RequestContext {
        &self.ctx
    }

    pub fn tenant_id(&self) -> TenantId {
        self.ctx.tenant_id()
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn published_at(&self) -> DateTime<Utc> {
        self.published_at
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}
