//! Pipeline orchestrator.
//!
//! Drives one lead through enrich -> score -> verify -> qualify against a
//! single ICP, persisting every state change and audit entry along the way.
//! Failures are isolated per lead: `process_raw_lead` never returns an error,
//! it reports one inside the outcome, so a batch always runs to completion.

use chrono::Utc;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::activity::ActivityLogger;
use crate::cache::EnrichmentCache;
use crate::db_storage::PipelineStore;
use crate::errors::{PipelineError, ResultExt};
use crate::icp::IcpConfig;
use crate::models::{
    Assignment, AssignmentStatus, BatchOutcome, EnrichmentStatus, Lead, PipelineOutcome,
    RawLeadInput, RawLeadTracking, RejectionRecord, Stage, StageResults,
};
use crate::scoring;
use crate::services::EnrichmentProvider;
use crate::strategy;
use crate::verification::CascadeVerifier;

pub struct PipelineOrchestrator {
    store: Arc<dyn PipelineStore>,
    providers: Vec<Arc<dyn EnrichmentProvider>>,
    cache: EnrichmentCache,
    verifier: CascadeVerifier,
}

impl PipelineOrchestrator {
    pub fn new(
        store: Arc<dyn PipelineStore>,
        providers: Vec<Arc<dyn EnrichmentProvider>>,
        verifier: CascadeVerifier,
    ) -> Self {
        Self {
            store,
            providers,
            cache: EnrichmentCache::new(),
            verifier,
        }
    }

    /// Runs one raw lead through the pipeline for one ICP.
    ///
    /// Never returns an error: any failure is captured in the outcome so the
    /// caller can keep processing the rest of its batch.
    pub async fn process_raw_lead(
        &self,
        raw: &RawLeadInput,
        icp: &IcpConfig,
        stage_overrides: Option<&[Stage]>,
    ) -> PipelineOutcome {
        let started = Instant::now();

        match self.run(raw, icp, stage_overrides).await {
            Ok(mut outcome) => {
                outcome.processing_time_ms = started.elapsed().as_millis() as u64;
                outcome
            }
            Err(e) => {
                tracing::error!("Pipeline failed for {}: {}", raw.email, e);
                PipelineOutcome::failure(e.to_string(), started.elapsed().as_millis() as u64)
            }
        }
    }

    /// Processes a batch of raw leads against one ICP. One lead's failure
    /// never aborts the batch.
    pub async fn process_batch(&self, raws: &[RawLeadInput], icp: &IcpConfig) -> BatchOutcome {
        let mut outcomes = Vec::with_capacity(raws.len());

        for raw in raws {
            outcomes.push(self.process_raw_lead(raw, icp, None).await);
        }

        let succeeded = outcomes.iter().filter(|o| o.success).count();
        let batch = BatchOutcome {
            processed: outcomes.len(),
            succeeded,
            failed: outcomes.len() - succeeded,
            outcomes,
        };

        tracing::info!(
            "Batch complete for ICP '{}': {} processed, {} succeeded, {} failed",
            icp.name,
            batch.processed,
            batch.succeeded,
            batch.failed
        );
        batch
    }

    async fn run(
        &self,
        raw: &RawLeadInput,
        icp: &IcpConfig,
        stage_overrides: Option<&[Stage]>,
    ) -> Result<PipelineOutcome, PipelineError> {
        icp.validate()?;
        if icp.tenant_id != raw.tenant_id {
            return Err(PipelineError::BadRequest(
                "lead and ICP belong to different tenants".to_string(),
            ));
        }

        let email = raw.email.trim().to_lowercase();
        if email.is_empty() || !email.contains('@') {
            return Err(PipelineError::BadRequest(format!(
                "invalid email address: '{}'",
                raw.email
            )));
        }

        let mut lead = self.resolve_lead(raw, &email).await?;

        // Idempotency guard: an existing assignment means this lead was
        // already processed for this ICP. Explicit stage overrides bypass
        // the guard to re-run individual stages.
        let existing = self.store.find_assignment(lead.id, icp.id).await?;
        let mut assignment = match existing {
            Some(assignment) if stage_overrides.is_none() => {
                tracing::info!(
                    "Skipping {}: already processed for ICP '{}' (status {})",
                    email,
                    icp.name,
                    assignment.status.as_str()
                );
                return Ok(PipelineOutcome {
                    success: true,
                    lead_id: Some(lead.id),
                    assignment_id: Some(assignment.id),
                    status: Some(assignment.status),
                    score: assignment.fit_score,
                    skipped: true,
                    stages: StageResults::default(),
                    error: None,
                    processing_time_ms: 0,
                });
            }
            Some(assignment) => assignment,
            None => {
                let assignment = Assignment {
                    id: Uuid::new_v4(),
                    lead_id: lead.id,
                    icp_id: icp.id,
                    tenant_id: raw.tenant_id,
                    status: AssignmentStatus::New,
                    fit_score: None,
                    score_breakdown: None,
                    qualified_at: None,
                    created_at: Utc::now(),
                    updated_at: None,
                };
                self.store
                    .insert_assignment(&assignment)
                    .await
                    .context("failed to create assignment")?;
                assignment
            }
        };

        let stages = stage_overrides.unwrap_or(&Stage::ALL);

        match self
            .run_stages(&mut lead, &mut assignment, raw, icp, stages)
            .await
        {
            Ok(outcome) => {
                self.track_raw_lead(raw, &lead, icp).await?;
                Ok(outcome)
            }
            Err(e) => {
                let logger = ActivityLogger::new(self.store.as_ref());
                if let Err(log_err) = logger
                    .pipeline_failed(&assignment, assignment.status.as_str(), &e.to_string())
                    .await
                {
                    tracing::error!("Failed to record pipeline failure: {}", log_err);
                }
                Err(e)
            }
        }
    }

    async fn run_stages(
        &self,
        lead: &mut Lead,
        assignment: &mut Assignment,
        raw: &RawLeadInput,
        icp: &IcpConfig,
        stages: &[Stage],
    ) -> Result<PipelineOutcome, PipelineError> {
        let logger = ActivityLogger::new(self.store.as_ref());
        let mut results = StageResults::default();
        let mut verification_ran = false;

        // ── Enrichment ──
        if stages.contains(&Stage::Enrich) && icp.enrichment_enabled {
            results.enrichment = Some(self.enrich(lead, assignment, raw, icp, &logger).await?);
        }

        // ── Scoring ──
        if stages.contains(&Stage::Score) {
            let score_result = scoring::score_lead(lead, icp);
            assignment.fit_score = Some(score_result.total_score);
            assignment.score_breakdown = Some(json!(score_result));
            let prior = assignment.status;
            advance_if_legal(assignment, AssignmentStatus::Scored)?;
            self.store
                .update_assignment(assignment)
                .await
                .context("failed to persist score")?;
            logger
                .scored(
                    assignment,
                    prior.as_str(),
                    score_result.total_score,
                    score_result.confidence,
                )
                .await?;
            results.scoring = Some(json!(score_result));

            // Auto-reject short-circuit: spend nothing further on leads that
            // cannot possibly qualify.
            if let Some(threshold) = icp.auto_reject_threshold {
                let prior = assignment.status;
                if score_result.total_score < threshold
                    && advance_if_legal(assignment, AssignmentStatus::Rejected)?
                {
                    self.store.update_assignment(assignment).await?;
                    self.store
                        .insert_rejection(&RejectionRecord {
                            id: Uuid::new_v4(),
                            lead_id: lead.id,
                            icp_id: icp.id,
                            assignment_id: assignment.id,
                            tenant_id: assignment.tenant_id,
                            rejection_stage: "scored".to_string(),
                            rejection_reason: format!(
                                "score {} below auto-reject threshold {}",
                                score_result.total_score, threshold
                            ),
                            rejection_category: "low_score".to_string(),
                            rejection_details: json!({
                                "score": score_result.total_score,
                                "threshold": threshold,
                                "confidence": score_result.confidence,
                            })
                            .to_string(),
                            can_be_overridden: true,
                            rejected_at: Utc::now(),
                        })
                        .await?;
                    logger
                        .auto_rejected(assignment, prior.as_str(), score_result.total_score, threshold)
                        .await?;

                    return Ok(PipelineOutcome {
                        success: true,
                        lead_id: Some(lead.id),
                        assignment_id: Some(assignment.id),
                        status: Some(assignment.status),
                        score: assignment.fit_score,
                        skipped: false,
                        stages: results,
                        error: None,
                        processing_time_ms: 0,
                    });
                }
            }
        }

        // ── Verification ──
        if stages.contains(&Stage::Verify) && icp.verification_enabled {
            let verification = self.verifier.verify(&lead.email).await;

            lead.email_verified = verification.is_valid;
            lead.email_verification_status = Some(verification.status.clone());
            lead.email_verification_confidence = Some(verification.confidence);
            lead.syntax_score = Some(verification.syntax_score);
            lead.domain_score = Some(verification.domain_score);
            lead.mailbox_score = Some(verification.mailbox_score);
            self.store
                .update_lead(lead)
                .await
                .context("failed to persist verification result")?;

            let prior = assignment.status;
            advance_if_legal(assignment, AssignmentStatus::Verified)?;
            self.store.update_assignment(assignment).await?;
            logger
                .verified(
                    assignment,
                    prior.as_str(),
                    &verification.status,
                    verification.confidence,
                    verification.total_cost,
                )
                .await?;

            results.verification = Some(json!(verification));
            verification_ran = true;
        }

        // ── Qualification ──
        if stages.contains(&Stage::Qualify) {
            results.qualification = Some(
                self.qualify(lead, assignment, icp, verification_ran, &logger)
                    .await?,
            );
        }

        Ok(PipelineOutcome {
            success: true,
            lead_id: Some(lead.id),
            assignment_id: Some(assignment.id),
            status: Some(assignment.status),
            score: assignment.fit_score,
            skipped: false,
            stages: results,
            error: None,
            processing_time_ms: 0,
        })
    }

    async fn resolve_lead(
        &self,
        raw: &RawLeadInput,
        email: &str,
    ) -> Result<Lead, PipelineError> {
        if let Some(lead) = self.store.find_lead_by_email(raw.tenant_id, email).await? {
            return Ok(lead);
        }

        let lead = Lead {
            id: Uuid::new_v4(),
            tenant_id: raw.tenant_id,
            raw_lead_id: Some(raw.id),
            email: email.to_string(),
            first_name: raw.first_name.clone(),
            last_name: raw.last_name.clone(),
            phone: raw.phone.clone(),
            job_title: raw.job_title.clone(),
            company_name: raw.company_name.clone(),
            company_domain: raw.company_domain.clone(),
            company_website: raw.company_website.clone(),
            company_employee_count: raw.company_employee_count.clone(),
            company_industry: raw.company_industry.clone(),
            company_description: None,
            country: raw.country.clone(),
            source: raw.source_name.clone(),
            tech_stack: Vec::new(),
            enrichment_status: EnrichmentStatus::Pending,
            enrichment_source: None,
            enrichment_providers: Vec::new(),
            enrichment_skipped_reason: None,
            enrichment_cost: 0.0,
            enriched_at: None,
            next_refresh_date: None,
            email_verified: false,
            email_verification_status: None,
            email_verification_confidence: None,
            syntax_score: None,
            domain_score: None,
            mailbox_score: None,
            created_at: Utc::now(),
            updated_at: None,
        };
        self.store
            .insert_lead(&lead)
            .await
            .context("failed to create lead")?;
        tracing::info!("Created lead {} for {}", lead.id, email);
        Ok(lead)
    }

    async fn enrich(
        &self,
        lead: &mut Lead,
        assignment: &mut Assignment,
        raw: &RawLeadInput,
        icp: &IcpConfig,
        logger: &ActivityLogger<'_>,
    ) -> Result<Value, PipelineError> {
        let source_name = lead
            .source
            .clone()
            .or_else(|| raw.source_name.clone())
            .unwrap_or_else(|| "other".to_string());

        let plan = strategy::plan(lead, &source_name, icp, Utc::now());

        if !plan.should_enrich {
            lead.enrichment_status = EnrichmentStatus::Skipped;
            lead.enrichment_skipped_reason = Some(plan.reason.clone());
            self.store.update_lead(lead).await?;
            logger
                .enrichment_skipped(assignment, assignment.status.as_str(), &plan.reason)
                .await?;
            tracing::info!("Enrichment skipped for {}: {}", lead.email, plan.reason);

            return Ok(json!({
                "performed": false,
                "skipped_reason": plan.reason,
                "priority": plan.priority,
            }));
        }

        let cache_key = lead
            .company_domain
            .clone()
            .unwrap_or_else(|| lead.email.clone());

        let (data, providers_used, cost, from_cache) = match self
            .cache
            .get(self.store.as_ref(), lead.tenant_id, &cache_key)
            .await?
        {
            Some(cached) => {
                let data = cached
                    .enriched_data
                    .as_object()
                    .cloned()
                    .unwrap_or_default();
                (data, cached.providers_used, 0.0, true)
            }
            None => {
                let (data, providers_used, cost, attempted) =
                    self.run_provider_waterfall(lead, &plan.providers_to_use).await;

                if !data.is_empty() {
                    self.cache
                        .put(
                            self.store.as_ref(),
                            lead.tenant_id,
                            &cache_key,
                            Value::Object(data.clone()),
                            providers_used.clone(),
                        )
                        .await?;
                } else if attempted > 0 && providers_used.is_empty() {
                    // Every provider errored out
                    lead.enrichment_status = EnrichmentStatus::Failed;
                }
                (data, providers_used, cost, false)
            }
        };

        let fields_filled = apply_enriched_fields(lead, &data);

        if lead.enrichment_status != EnrichmentStatus::Failed {
            lead.enrichment_status = EnrichmentStatus::Completed;
        }
        lead.enrichment_source = Some(source_name.clone());
        lead.enrichment_providers = providers_used.clone();
        lead.enrichment_cost += cost;
        lead.enriched_at = Some(Utc::now());
        lead.next_refresh_date = Some(strategy::next_refresh(&source_name, Utc::now()));
        self.store
            .update_lead(lead)
            .await
            .context("failed to persist enrichment")?;

        let prior = assignment.status;
        advance_if_legal(assignment, AssignmentStatus::Enriched)?;
        self.store.update_assignment(assignment).await?;
        logger
            .enrichment_completed(
                assignment,
                prior.as_str(),
                &providers_used,
                &fields_filled,
                cost,
                from_cache,
            )
            .await?;

        tracing::info!(
            "Enriched {} via [{}], {} fields filled, cost ${:.3}",
            lead.email,
            providers_used.join(", "),
            fields_filled.len(),
            cost
        );

        Ok(json!({
            "performed": true,
            "providers": providers_used,
            "fields_filled": fields_filled,
            "cost": cost,
            "from_cache": from_cache,
            "priority": plan.priority,
        }))
    }

    /// Calls the planned providers in order. Provider failures are logged and
    /// skipped; whatever data the rest returned is still used.
    async fn run_provider_waterfall(
        &self,
        lead: &Lead,
        planned: &[String],
    ) -> (Map<String, Value>, Vec<String>, f64, usize) {
        let mut data = Map::new();
        let mut providers_used = Vec::new();
        let mut cost = 0.0;
        let mut attempted = 0;

        for name in planned {
            let provider = match self.providers.iter().find(|p| p.name() == name) {
                Some(p) => p,
                None => {
                    tracing::warn!("No client registered for provider '{}'", name);
                    continue;
                }
            };

            attempted += 1;
            match provider.enrich(lead).await {
                Ok(fields) => {
                    cost += provider.cost_per_call();
                    providers_used.push(name.clone());
                    for (key, value) in fields {
                        data.entry(key).or_insert(value);
                    }
                }
                Err(e) => {
                    tracing::warn!("Provider '{}' failed for {}: {}", name, lead.email, e);
                }
            }
        }

        (data, providers_used, cost, attempted)
    }

    async fn qualify(
        &self,
        lead: &mut Lead,
        assignment: &mut Assignment,
        icp: &IcpConfig,
        verification_ran: bool,
        logger: &ActivityLogger<'_>,
    ) -> Result<Value, PipelineError> {
        let score = assignment.fit_score.unwrap_or(0.0);
        // With verification disabled the email condition is waived.
        let email_ok = !verification_ran || lead.email_verified;

        let decision = if score >= icp.auto_approve_threshold && email_ok {
            AssignmentStatus::Qualified
        } else if score >= icp.review_threshold {
            AssignmentStatus::PendingReview
        } else {
            AssignmentStatus::Rejected
        };

        let prior = assignment.status;
        let applied = advance_if_legal(assignment, decision)?;
        if !applied {
            // Stage re-run on an already-decided assignment: the earlier
            // decision stands.
            tracing::warn!(
                "Assignment {} already {}, keeping decision",
                assignment.id,
                assignment.status.as_str()
            );
            return Ok(json!({
                "decision": assignment.status.as_str(),
                "retained": true,
                "score": score,
                "email_verified": lead.email_verified,
            }));
        }
        if decision == AssignmentStatus::Qualified {
            assignment.qualified_at = Some(Utc::now());
        }
        self.store
            .update_assignment(assignment)
            .await
            .context("failed to persist qualification")?;

        if decision == AssignmentStatus::Rejected {
            self.store
                .insert_rejection(&RejectionRecord {
                    id: Uuid::new_v4(),
                    lead_id: lead.id,
                    icp_id: icp.id,
                    assignment_id: assignment.id,
                    tenant_id: assignment.tenant_id,
                    rejection_stage: "qualify".to_string(),
                    rejection_reason: format!(
                        "score {} below review threshold {}",
                        score, icp.review_threshold
                    ),
                    rejection_category: "below_review_threshold".to_string(),
                    rejection_details: json!({
                        "score": score,
                        "review_threshold": icp.review_threshold,
                        "email_verified": lead.email_verified,
                    })
                    .to_string(),
                    can_be_overridden: true,
                    rejected_at: Utc::now(),
                })
                .await?;
        }

        logger
            .qualification_decision(
                assignment,
                prior.as_str(),
                decision.as_str(),
                score,
                lead.email_verified,
            )
            .await?;

        tracing::info!(
            "Qualification for {} against '{}': {} (score {})",
            lead.email,
            icp.name,
            decision.as_str(),
            score
        );

        Ok(json!({
            "decision": decision.as_str(),
            "score": score,
            "email_verified": lead.email_verified,
        }))
    }

    async fn track_raw_lead(
        &self,
        raw: &RawLeadInput,
        lead: &Lead,
        icp: &IcpConfig,
    ) -> Result<(), PipelineError> {
        let mut tracking = self
            .store
            .find_raw_tracking(raw.id)
            .await?
            .unwrap_or(RawLeadTracking {
                raw_lead_id: raw.id,
                tenant_id: raw.tenant_id,
                lead_id: None,
                processed_by_icps: Vec::new(),
                fully_processed: false,
                processed_at: None,
            });

        tracking.lead_id = Some(lead.id);
        if !tracking.processed_by_icps.contains(&icp.id) {
            tracking.processed_by_icps.push(icp.id);
        }

        let active_icps = self.store.count_active_icps(raw.tenant_id).await?;
        if !tracking.fully_processed && tracking.processed_by_icps.len() as i64 >= active_icps {
            tracking.fully_processed = true;
            tracking.processed_at = Some(Utc::now());
        }

        self.store.upsert_raw_tracking(&tracking).await
    }
}

/// Advances the assignment when the transition is legal. Stage re-runs under
/// explicit overrides hit assignments that are already at or past the target
/// status; those keep their status and only refresh the stage's data.
fn advance_if_legal(
    assignment: &mut Assignment,
    next: AssignmentStatus,
) -> Result<bool, PipelineError> {
    if !assignment.status.can_transition_to(next) {
        return Ok(false);
    }
    assignment.advance(next)?;
    Ok(true)
}

/// Backfill-only merge: enriched values never overwrite data the lead already
/// has, except the tech stack which is a union. Returns the fields actually
/// filled.
fn apply_enriched_fields(lead: &mut Lead, data: &Map<String, Value>) -> Vec<String> {
    let mut filled = Vec::new();

    let mut backfill = |field: &str, slot: &mut Option<String>, filled: &mut Vec<String>| {
        if slot.as_deref().map_or(true, |v| v.trim().is_empty()) {
            if let Some(value) = data.get(field).and_then(Value::as_str) {
                *slot = Some(value.to_string());
                filled.push(field.to_string());
            }
        }
    };

    backfill(
        "company_employee_count",
        &mut lead.company_employee_count,
        &mut filled,
    );
    backfill("company_industry", &mut lead.company_industry, &mut filled);
    backfill(
        "company_description",
        &mut lead.company_description,
        &mut filled,
    );
    backfill("country", &mut lead.country, &mut filled);

    if let Some(techs) = data.get("company_tech_stack").and_then(Value::as_array) {
        let mut added = false;
        for tech in techs.iter().filter_map(Value::as_str) {
            if !lead.tech_stack.iter().any(|t| t.eq_ignore_ascii_case(tech)) {
                lead.tech_stack.push(tech.to_string());
                added = true;
            }
        }
        if added {
            filled.push("company_tech_stack".to_string());
        }
    }

    filled
}
