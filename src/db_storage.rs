//! Persistence layer behind the `PipelineStore` trait.
//!
//! The orchestrator talks to storage only through the trait, so its state
//! machine and failure isolation are testable against an in-memory double.
//! `PgStore` is the production implementation over the Postgres pool.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::PipelineError;
use crate::models::{
    ActivityEntry, Assignment, CachedEnrichment, Lead, ProcessingStats, RawLeadTracking,
    RejectionRecord,
};

#[async_trait]
pub trait PipelineStore: Send + Sync {
    async fn find_lead_by_email(
        &self,
        tenant_id: Uuid,
        email: &str,
    ) -> Result<Option<Lead>, PipelineError>;
    async fn insert_lead(&self, lead: &Lead) -> Result<(), PipelineError>;
    async fn update_lead(&self, lead: &Lead) -> Result<(), PipelineError>;

    async fn find_assignment(
        &self,
        lead_id: Uuid,
        icp_id: Uuid,
    ) -> Result<Option<Assignment>, PipelineError>;
    async fn insert_assignment(&self, assignment: &Assignment) -> Result<(), PipelineError>;
    async fn update_assignment(&self, assignment: &Assignment) -> Result<(), PipelineError>;

    async fn insert_rejection(&self, rejection: &RejectionRecord) -> Result<(), PipelineError>;
    async fn append_activity(&self, entry: &ActivityEntry) -> Result<(), PipelineError>;

    async fn cache_get(
        &self,
        tenant_id: Uuid,
        key_hash: &str,
    ) -> Result<Option<CachedEnrichment>, PipelineError>;
    async fn cache_put(&self, entry: &CachedEnrichment) -> Result<(), PipelineError>;

    async fn find_raw_tracking(
        &self,
        raw_lead_id: Uuid,
    ) -> Result<Option<RawLeadTracking>, PipelineError>;
    async fn upsert_raw_tracking(&self, tracking: &RawLeadTracking) -> Result<(), PipelineError>;
    async fn count_active_icps(&self, tenant_id: Uuid) -> Result<i64, PipelineError>;

    async fn processing_stats(&self, tenant_id: Uuid) -> Result<ProcessingStats, PipelineError>;
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PipelineStore for PgStore {
    async fn find_lead_by_email(
        &self,
        tenant_id: Uuid,
        email: &str,
    ) -> Result<Option<Lead>, PipelineError> {
        let lead = sqlx::query_as::<_, Lead>(
            "SELECT * FROM leads WHERE tenant_id = $1 AND lower(email) = lower($2)",
        )
        .bind(tenant_id)
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(lead)
    }

    async fn insert_lead(&self, lead: &Lead) -> Result<(), PipelineError> {
        sqlx::query(
            r#"
            INSERT INTO leads (
                id, tenant_id, raw_lead_id, email, first_name, last_name, phone,
                job_title, company_name, company_domain, company_website,
                company_employee_count, company_industry, company_description,
                country, source, tech_stack, enrichment_status, enrichment_source,
                enrichment_providers, enrichment_skipped_reason, enrichment_cost,
                enriched_at, next_refresh_date, email_verified,
                email_verification_status, email_verification_confidence,
                syntax_score, domain_score, mailbox_score, created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28,
                $29, $30, $31, $32
            )
            "#,
        )
        .bind(lead.id)
        .bind(lead.tenant_id)
        .bind(lead.raw_lead_id)
        .bind(&lead.email)
        .bind(&lead.first_name)
        .bind(&lead.last_name)
        .bind(&lead.phone)
        .bind(&lead.job_title)
        .bind(&lead.company_name)
        .bind(&lead.company_domain)
        .bind(&lead.company_website)
        .bind(&lead.company_employee_count)
        .bind(&lead.company_industry)
        .bind(&lead.company_description)
        .bind(&lead.country)
        .bind(&lead.source)
        .bind(&lead.tech_stack)
        .bind(lead.enrichment_status)
        .bind(&lead.enrichment_source)
        .bind(&lead.enrichment_providers)
        .bind(&lead.enrichment_skipped_reason)
        .bind(lead.enrichment_cost)
        .bind(lead.enriched_at)
        .bind(lead.next_refresh_date)
        .bind(lead.email_verified)
        .bind(&lead.email_verification_status)
        .bind(lead.email_verification_confidence)
        .bind(lead.syntax_score)
        .bind(lead.domain_score)
        .bind(lead.mailbox_score)
        .bind(lead.created_at)
        .bind(lead.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_lead(&self, lead: &Lead) -> Result<(), PipelineError> {
        sqlx::query(
            r#"
            UPDATE leads SET
                first_name = $2, last_name = $3, phone = $4, job_title = $5,
                company_name = $6, company_domain = $7, company_website = $8,
                company_employee_count = $9, company_industry = $10,
                company_description = $11, country = $12, tech_stack = $13,
                enrichment_status = $14, enrichment_source = $15,
                enrichment_providers = $16, enrichment_skipped_reason = $17,
                enrichment_cost = $18, enriched_at = $19, next_refresh_date = $20,
                email_verified = $21, email_verification_status = $22,
                email_verification_confidence = $23, syntax_score = $24,
                domain_score = $25, mailbox_score = $26, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(lead.id)
        .bind(&lead.first_name)
        .bind(&lead.last_name)
        .bind(&lead.phone)
        .bind(&lead.job_title)
        .bind(&lead.company_name)
        .bind(&lead.company_domain)
        .bind(&lead.company_website)
        .bind(&lead.company_employee_count)
        .bind(&lead.company_industry)
        .bind(&lead.company_description)
        .bind(&lead.country)
        .bind(&lead.tech_stack)
        .bind(lead.enrichment_status)
        .bind(&lead.enrichment_source)
        .bind(&lead.enrichment_providers)
        .bind(&lead.enrichment_skipped_reason)
        .bind(lead.enrichment_cost)
        .bind(lead.enriched_at)
        .bind(lead.next_refresh_date)
        .bind(lead.email_verified)
        .bind(&lead.email_verification_status)
        .bind(lead.email_verification_confidence)
        .bind(lead.syntax_score)
        .bind(lead.domain_score)
        .bind(lead.mailbox_score)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_assignment(
        &self,
        lead_id: Uuid,
        icp_id: Uuid,
    ) -> Result<Option<Assignment>, PipelineError> {
        let assignment = sqlx::query_as::<_, Assignment>(
            "SELECT * FROM lead_icp_assignments WHERE lead_id = $1 AND icp_id = $2",
        )
        .bind(lead_id)
        .bind(icp_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(assignment)
    }

    async fn insert_assignment(&self, assignment: &Assignment) -> Result<(), PipelineError> {
        sqlx::query(
            r#"
            INSERT INTO lead_icp_assignments (
                id, lead_id, icp_id, tenant_id, status, fit_score,
                score_breakdown, qualified_at, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(assignment.id)
        .bind(assignment.lead_id)
        .bind(assignment.icp_id)
        .bind(assignment.tenant_id)
        .bind(assignment.status)
        .bind(assignment.fit_score)
        .bind(&assignment.score_breakdown)
        .bind(assignment.qualified_at)
        .bind(assignment.created_at)
        .bind(assignment.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_assignment(&self, assignment: &Assignment) -> Result<(), PipelineError> {
        sqlx::query(
            r#"
            UPDATE lead_icp_assignments SET
                status = $2, fit_score = $3, score_breakdown = $4,
                qualified_at = $5, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(assignment.id)
        .bind(assignment.status)
        .bind(assignment.fit_score)
        .bind(&assignment.score_breakdown)
        .bind(assignment.qualified_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_rejection(&self, rejection: &RejectionRecord) -> Result<(), PipelineError> {
        sqlx::query(
            r#"
            INSERT INTO lead_rejections (
                id, lead_id, icp_id, assignment_id, tenant_id, rejection_stage,
                rejection_reason, rejection_category, rejection_details,
                can_be_overridden, rejected_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(rejection.id)
        .bind(rejection.lead_id)
        .bind(rejection.icp_id)
        .bind(rejection.assignment_id)
        .bind(rejection.tenant_id)
        .bind(&rejection.rejection_stage)
        .bind(&rejection.rejection_reason)
        .bind(&rejection.rejection_category)
        .bind(&rejection.rejection_details)
        .bind(rejection.can_be_overridden)
        .bind(rejection.rejected_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn append_activity(&self, entry: &ActivityEntry) -> Result<(), PipelineError> {
        sqlx::query(
            r#"
            INSERT INTO lead_activity_log (
                id, tenant_id, lead_id, icp_id, assignment_id, from_stage,
                to_stage, reason, details, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(entry.id)
        .bind(entry.tenant_id)
        .bind(entry.lead_id)
        .bind(entry.icp_id)
        .bind(entry.assignment_id)
        .bind(&entry.from_stage)
        .bind(&entry.to_stage)
        .bind(&entry.reason)
        .bind(&entry.details)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn cache_get(
        &self,
        tenant_id: Uuid,
        key_hash: &str,
    ) -> Result<Option<CachedEnrichment>, PipelineError> {
        let entry = sqlx::query_as::<_, CachedEnrichment>(
            r#"
            SELECT tenant_id, key_hash, enriched_data, providers_used, expires_at
            FROM enrichment_cache
            WHERE tenant_id = $1 AND key_hash = $2 AND expires_at > NOW()
            "#,
        )
        .bind(tenant_id)
        .bind(key_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(entry)
    }

    async fn cache_put(&self, entry: &CachedEnrichment) -> Result<(), PipelineError> {
        sqlx::query(
            r#"
            INSERT INTO enrichment_cache (tenant_id, key_hash, enriched_data, providers_used, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (tenant_id, key_hash) DO UPDATE SET
                enriched_data = EXCLUDED.enriched_data,
                providers_used = EXCLUDED.providers_used,
                expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(entry.tenant_id)
        .bind(&entry.key_hash)
        .bind(&entry.enriched_data)
        .bind(&entry.providers_used)
        .bind(entry.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_raw_tracking(
        &self,
        raw_lead_id: Uuid,
    ) -> Result<Option<RawLeadTracking>, PipelineError> {
        let tracking = sqlx::query_as::<_, RawLeadTracking>(
            "SELECT * FROM raw_lead_tracking WHERE raw_lead_id = $1",
        )
        .bind(raw_lead_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(tracking)
    }

    async fn upsert_raw_tracking(&self, tracking: &RawLeadTracking) -> Result<(), PipelineError> {
        sqlx::query(
            r#"
            INSERT INTO raw_lead_tracking (
                raw_lead_id, tenant_id, lead_id, processed_by_icps,
                fully_processed, processed_at
            ) VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (raw_lead_id) DO UPDATE SET
                lead_id = EXCLUDED.lead_id,
                processed_by_icps = EXCLUDED.processed_by_icps,
                fully_processed = EXCLUDED.fully_processed,
                processed_at = EXCLUDED.processed_at
            "#,
        )
        .bind(tracking.raw_lead_id)
        .bind(tracking.tenant_id)
        .bind(tracking.lead_id)
        .bind(&tracking.processed_by_icps)
        .bind(tracking.fully_processed)
        .bind(tracking.processed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn count_active_icps(&self, tenant_id: Uuid) -> Result<i64, PipelineError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM icp_configs WHERE tenant_id = $1 AND is_active = TRUE",
        )
        .bind(tenant_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn processing_stats(&self, tenant_id: Uuid) -> Result<ProcessingStats, PipelineError> {
        let (total_leads,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM leads WHERE tenant_id = $1")
                .bind(tenant_id)
                .fetch_one(&self.pool)
                .await?;
        let (raw_leads,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM raw_lead_tracking WHERE tenant_id = $1")
                .bind(tenant_id)
                .fetch_one(&self.pool)
                .await?;
        let (processed_leads,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM raw_lead_tracking WHERE tenant_id = $1 AND fully_processed = TRUE",
        )
        .bind(tenant_id)
        .fetch_one(&self.pool)
        .await?;
        let (error_leads,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM leads WHERE tenant_id = $1 AND enrichment_status = 'failed'",
        )
        .bind(tenant_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(ProcessingStats {
            total_leads,
            raw_leads,
            processed_leads,
            error_leads,
        })
    }
}
