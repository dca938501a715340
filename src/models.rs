use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::errors::PipelineError;

// ============ Database Models ============

/// Canonical contact+company profile, unique per (tenant_id, email).
///
/// Created on first sight of an email for a tenant, updated by the enrichment
/// and verification stages, never deleted by the pipeline.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    pub tenant_id: Uuid,
    /// Raw lead this profile was first created from.
    pub raw_lead_id: Option<Uuid>,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub job_title: Option<String>,
    pub company_name: Option<String>,
    pub company_domain: Option<String>,
    pub company_website: Option<String>,
    /// Kept as text: sources deliver values like "8,100" or "50-200".
    pub company_employee_count: Option<String>,
    pub company_industry: Option<String>,
    pub company_description: Option<String>,
    pub country: Option<String>,
    /// Name of the source that first delivered this lead.
    pub source: Option<String>,
    pub tech_stack: Vec<String>,
    // Enrichment bookkeeping
    pub enrichment_status: EnrichmentStatus,
    pub enrichment_source: Option<String>,
    pub enrichment_providers: Vec<String>,
    pub enrichment_skipped_reason: Option<String>,
    pub enrichment_cost: f64,
    pub enriched_at: Option<DateTime<Utc>>,
    pub next_refresh_date: Option<DateTime<Utc>>,
    // Verification bookkeeping
    pub email_verified: bool,
    pub email_verification_status: Option<String>,
    pub email_verification_confidence: Option<f64>,
    pub syntax_score: Option<f64>,
    pub domain_score: Option<f64>,
    pub mailbox_score: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Enrichment lifecycle of a lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentStatus {
    Pending,
    Completed,
    Skipped,
    Failed,
}

/// The scored pairing of one lead with one ICP, unique per (lead_id, icp_id).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Assignment {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub icp_id: Uuid,
    pub tenant_id: Uuid,
    pub status: AssignmentStatus,
    pub fit_score: Option<f64>,
    pub score_breakdown: Option<serde_json::Value>,
    pub qualified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Assignment {
    /// Moves the assignment forward through the state machine.
    ///
    /// Statuses never move backwards and terminal statuses never change;
    /// violating either is a programming error surfaced as a configuration
    /// error rather than silent state corruption.
    pub fn advance(&mut self, next: AssignmentStatus) -> Result<(), PipelineError> {
        if !self.status.can_transition_to(next) {
            return Err(PipelineError::Configuration(format!(
                "invalid assignment transition {} -> {}",
                self.status.as_str(),
                next.as_str()
            )));
        }
        self.status = next;
        self.updated_at = Some(Utc::now());
        Ok(())
    }
}

/// Assignment state machine:
/// `new -> enriched -> scored -> {rejected | verified -> {qualified | pending_review | rejected}}`.
///
/// Enrichment may be skipped, so `new -> scored` is also legal. Qualification
/// may run without verification when the ICP disables it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    New,
    Enriched,
    Scored,
    Verified,
    Qualified,
    PendingReview,
    Rejected,
}

impl AssignmentStatus {
    fn rank(self) -> u8 {
        match self {
            AssignmentStatus::New => 0,
            AssignmentStatus::Enriched => 1,
            AssignmentStatus::Scored => 2,
            AssignmentStatus::Verified => 3,
            AssignmentStatus::Qualified
            | AssignmentStatus::PendingReview
            | AssignmentStatus::Rejected => 4,
        }
    }

    /// Whether this status ends the assignment's lifecycle.
    pub fn is_terminal(self) -> bool {
        self.rank() == 4
    }

    /// Forward-only transitions; scoring must precede any terminal decision.
    pub fn can_transition_to(self, next: AssignmentStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next.rank() <= self.rank() {
            return false;
        }
        // Verification and terminal decisions require scoring to have
        // happened first.
        if next.rank() > AssignmentStatus::Scored.rank()
            && self.rank() < AssignmentStatus::Scored.rank()
        {
            return false;
        }
        true
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AssignmentStatus::New => "new",
            AssignmentStatus::Enriched => "enriched",
            AssignmentStatus::Scored => "scored",
            AssignmentStatus::Verified => "verified",
            AssignmentStatus::Qualified => "qualified",
            AssignmentStatus::PendingReview => "pending_review",
            AssignmentStatus::Rejected => "rejected",
        }
    }
}

/// Immutable audit entry created when an assignment is rejected.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct RejectionRecord {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub icp_id: Uuid,
    pub assignment_id: Uuid,
    pub tenant_id: Uuid,
    /// Pipeline stage at which the rejection happened ("scored", "qualify").
    pub rejection_stage: String,
    pub rejection_reason: String,
    /// "low_score" for the auto-reject short-circuit,
    /// "below_review_threshold" for the qualification decision.
    pub rejection_category: String,
    pub rejection_details: String,
    pub can_be_overridden: bool,
    pub rejected_at: DateTime<Utc>,
}

/// One row of the per-assignment audit trail. Appended on every stage
/// transition, success or failure.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub lead_id: Uuid,
    pub icp_id: Uuid,
    pub assignment_id: Uuid,
    pub from_stage: Option<String>,
    pub to_stage: String,
    pub reason: String,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Durable read-through enrichment cache entry, tenant-scoped and keyed by a
/// SHA-256 hash of the company domain or email.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CachedEnrichment {
    pub tenant_id: Uuid,
    pub key_hash: String,
    pub enriched_data: serde_json::Value,
    pub providers_used: Vec<String>,
    pub expires_at: DateTime<Utc>,
}

/// Cross-reference bookkeeping for the originating raw lead: which ICPs have
/// processed it, and whether every active tenant ICP has.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct RawLeadTracking {
    pub raw_lead_id: Uuid,
    pub tenant_id: Uuid,
    pub lead_id: Option<Uuid>,
    pub processed_by_icps: Vec<Uuid>,
    pub fully_processed: bool,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Per-tenant processing counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingStats {
    pub total_leads: i64,
    pub raw_leads: i64,
    pub processed_leads: i64,
    pub error_leads: i64,
}

// ============ API Request/Response Models ============

/// Caller-supplied raw lead, as delivered by a source connector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawLeadInput {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub job_title: Option<String>,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub company_domain: Option<String>,
    #[serde(default)]
    pub company_website: Option<String>,
    #[serde(default)]
    pub company_employee_count: Option<String>,
    #[serde(default)]
    pub company_industry: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub source_name: Option<String>,
}

/// Pipeline stages a caller may explicitly re-run on an existing assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Enrich,
    Score,
    Verify,
    Qualify,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Enrich, Stage::Score, Stage::Verify, Stage::Qualify];
}

/// Structured per-stage sub-results collected during one lead's run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageResults {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrichment: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scoring: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qualification: Option<serde_json::Value>,
}

/// Structured outcome of one lead's pipeline run. Failures are reported here
/// rather than propagated, so batch callers never lose a whole batch to one
/// lead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutcome {
    pub success: bool,
    pub lead_id: Option<Uuid>,
    pub assignment_id: Option<Uuid>,
    pub status: Option<AssignmentStatus>,
    pub score: Option<f64>,
    #[serde(default)]
    pub skipped: bool,
    pub stages: StageResults,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub processing_time_ms: u64,
}

impl PipelineOutcome {
    pub fn failure(error: String, elapsed_ms: u64) -> Self {
        Self {
            success: false,
            lead_id: None,
            assignment_id: None,
            status: None,
            score: None,
            skipped: false,
            stages: StageResults::default(),
            error: Some(error),
            processing_time_ms: elapsed_ms,
        }
    }
}

/// Aggregate result of a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub outcomes: Vec<PipelineOutcome>,
}
