//! Per-assignment audit trail.
//!
//! Every stage transition, skip, rejection and failure is appended to the
//! activity log with a machine-readable details payload. The log is
//! append-only; nothing in the pipeline ever updates or deletes an entry.

use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::db_storage::PipelineStore;
use crate::errors::PipelineError;
use crate::models::{ActivityEntry, Assignment};

pub struct ActivityLogger<'a> {
    store: &'a dyn PipelineStore,
}

impl<'a> ActivityLogger<'a> {
    pub fn new(store: &'a dyn PipelineStore) -> Self {
        Self { store }
    }

    pub async fn stage_transition(
        &self,
        assignment: &Assignment,
        from_stage: Option<&str>,
        to_stage: &str,
        reason: &str,
        details: Value,
    ) -> Result<(), PipelineError> {
        let entry = ActivityEntry {
            id: Uuid::new_v4(),
            tenant_id: assignment.tenant_id,
            lead_id: assignment.lead_id,
            icp_id: assignment.icp_id,
            assignment_id: assignment.id,
            from_stage: from_stage.map(str::to_string),
            to_stage: to_stage.to_string(),
            reason: reason.to_string(),
            details,
            created_at: Utc::now(),
        };

        tracing::debug!(
            "Activity: assignment {} {} -> {} ({})",
            assignment.id,
            from_stage.unwrap_or("-"),
            to_stage,
            reason
        );

        self.store.append_activity(&entry).await
    }

    pub async fn enrichment_completed(
        &self,
        assignment: &Assignment,
        from_stage: &str,
        providers: &[String],
        fields_filled: &[String],
        cost: f64,
        from_cache: bool,
    ) -> Result<(), PipelineError> {
        self.stage_transition(
            assignment,
            Some(from_stage),
            "enriched",
            "enrichment completed",
            json!({
                "providers": providers,
                "fields_filled": fields_filled,
                "cost": cost,
                "from_cache": from_cache,
            }),
        )
        .await
    }

    pub async fn enrichment_skipped(
        &self,
        assignment: &Assignment,
        from_stage: &str,
        reason: &str,
    ) -> Result<(), PipelineError> {
        self.stage_transition(
            assignment,
            Some(from_stage),
            "enrichment_skipped",
            reason,
            json!({ "skip_reason": reason }),
        )
        .await
    }

    pub async fn scored(
        &self,
        assignment: &Assignment,
        from_stage: &str,
        score: f64,
        confidence: f64,
    ) -> Result<(), PipelineError> {
        self.stage_transition(
            assignment,
            Some(from_stage),
            "scored",
            "fit score calculated",
            json!({ "score": score, "confidence": confidence }),
        )
        .await
    }

    pub async fn auto_rejected(
        &self,
        assignment: &Assignment,
        from_stage: &str,
        score: f64,
        threshold: f64,
    ) -> Result<(), PipelineError> {
        self.stage_transition(
            assignment,
            Some(from_stage),
            "rejected",
            "score below auto-reject threshold",
            json!({ "score": score, "threshold": threshold, "category": "low_score" }),
        )
        .await
    }

    pub async fn verified(
        &self,
        assignment: &Assignment,
        from_stage: &str,
        status: &str,
        confidence: f64,
        cost: f64,
    ) -> Result<(), PipelineError> {
        self.stage_transition(
            assignment,
            Some(from_stage),
            "verified",
            "email verification completed",
            json!({ "verification_status": status, "confidence": confidence, "cost": cost }),
        )
        .await
    }

    pub async fn qualification_decision(
        &self,
        assignment: &Assignment,
        from_stage: &str,
        decision: &str,
        score: f64,
        email_verified: bool,
    ) -> Result<(), PipelineError> {
        self.stage_transition(
            assignment,
            Some(from_stage),
            decision,
            "qualification decision",
            json!({ "score": score, "email_verified": email_verified }),
        )
        .await
    }

    pub async fn pipeline_failed(
        &self,
        assignment: &Assignment,
        stage: &str,
        error: &str,
    ) -> Result<(), PipelineError> {
        self.stage_transition(
            assignment,
            Some(stage),
            "error",
            "pipeline run failed",
            json!({ "stage": stage, "error": error }),
        )
        .await
    }
}
