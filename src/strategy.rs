//! Enrichment strategy planner.
//!
//! Pure decision logic: given the current lead profile, the name of the source
//! that delivered it and the ICP being processed, decide whether spending
//! money on enrichment is worth it, which providers to call and at what
//! estimated cost. No I/O happens here; calling twice with identical inputs
//! yields an identical plan.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::icp::IcpConfig;
use crate::models::Lead;

/// Quality tier of a lead source, from the fixed classification table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTier {
    High,
    Medium,
    Low,
    Unknown,
}

impl SourceTier {
    /// Days before data from this tier is considered stale.
    pub fn refresh_interval_days(self) -> i64 {
        match self {
            SourceTier::High => 90,
            SourceTier::Medium => 60,
            SourceTier::Low | SourceTier::Unknown => 30,
        }
    }
}

/// Classifies a raw source name into a quality tier.
pub fn classify_source(source_name: &str) -> SourceTier {
    match source_name {
        "apollo" | "hunter" | "peopledatalabs" | "clearbit" => SourceTier::High,
        "linkedin_scraper" => SourceTier::Medium,
        "website_scraper" => SourceTier::Low,
        _ => SourceTier::Unknown,
    }
}

/// Fixed per-call provider costs in dollars.
pub fn provider_cost(provider: &str) -> f64 {
    match provider {
        "company_search" => 0.002,
        // tech_detect and knowledge_graph are free tiers
        _ => 0.0,
    }
}

/// Plan priority, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanPriority {
    High,
    Medium,
    Low,
    Skip,
}

/// Immutable enrichment decision. Recomputed on every run, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentPlan {
    pub should_enrich: bool,
    pub reason: String,
    pub providers_to_use: Vec<String>,
    pub fields_to_enrich: Vec<String>,
    pub estimated_cost: f64,
    pub priority: PlanPriority,
}

impl EnrichmentPlan {
    fn skip(reason: impl Into<String>) -> Self {
        Self {
            should_enrich: false,
            reason: reason.into(),
            providers_to_use: Vec::new(),
            fields_to_enrich: Vec::new(),
            estimated_cost: 0.0,
            priority: PlanPriority::Skip,
        }
    }
}

/// Creates an enrichment plan for one lead against one ICP.
///
/// `now` is passed in so the decision stays a pure function of its inputs.
pub fn plan(lead: &Lead, raw_source_name: &str, icp: &IcpConfig, now: DateTime<Utc>) -> EnrichmentPlan {
    let tier = classify_source(raw_source_name);

    tracing::debug!(
        "Creating enrichment plan for {} (source: {}, tier: {:?})",
        lead.email,
        raw_source_name,
        tier
    );

    if tier == SourceTier::High {
        match lead.enriched_at {
            None => {
                return EnrichmentPlan::skip(format!(
                    "Source '{}' provides pre-enriched data",
                    raw_source_name
                ));
            }
            Some(enriched_at) => {
                let age_days = (now - enriched_at).num_days();
                if age_days < tier.refresh_interval_days() {
                    return EnrichmentPlan::skip(format!(
                        "High-quality source '{}' with fresh data",
                        raw_source_name
                    ));
                }
            }
        }
    }

    let (is_stale, age_days) = match lead.enriched_at {
        Some(enriched_at) => {
            let age = (now - enriched_at).num_days();
            (age >= tier.refresh_interval_days(), age)
        }
        None => (false, 0),
    };

    let missing_fields = missing_fields(lead, icp);

    if missing_fields.is_empty() && !is_stale {
        return EnrichmentPlan::skip("All required fields present and data is fresh");
    }

    let providers = select_providers(tier, &missing_fields);

    if providers.is_empty() {
        return EnrichmentPlan::skip("No providers available");
    }

    let estimated_cost = providers.iter().map(|p| provider_cost(p)).sum();
    let priority = calculate_priority(lead, &missing_fields, tier, is_stale);

    let mut reasons = Vec::new();
    if is_stale {
        reasons.push(format!("Data is stale ({} days old)", age_days));
    } else if lead.enriched_at.is_none() {
        reasons.push("Never enriched".to_string());
    }
    if matches!(tier, SourceTier::Low | SourceTier::Unknown) {
        reasons.push(format!("Low-quality source '{}'", raw_source_name));
    }
    if !missing_fields.is_empty() {
        reasons.push(format!("Missing {} fields", missing_fields.len()));
    }

    EnrichmentPlan {
        should_enrich: true,
        reason: reasons.join("; "),
        providers_to_use: providers,
        fields_to_enrich: missing_fields,
        estimated_cost,
        priority,
    }
}

/// Fields missing from the lead, filtered to those the ICP actually scores on.
fn missing_fields(lead: &Lead, icp: &IcpConfig) -> Vec<String> {
    let mut missing = Vec::new();

    if is_blank(&lead.company_employee_count) {
        missing.push("company_employee_count".to_string());
    }
    if is_blank(&lead.company_industry) {
        missing.push("company_industry".to_string());
    }
    if is_blank(&lead.company_description) {
        missing.push("company_description".to_string());
    }
    if is_blank(&lead.country) {
        missing.push("country".to_string());
    }
    if lead.tech_stack.is_empty() {
        missing.push("company_tech_stack".to_string());
    }

    let rules = &icp.scoring_rules;
    if !rules.has_tech_criteria() {
        missing.retain(|f| f != "company_tech_stack");
    }
    if rules.ideal_company_size_min.is_none() {
        missing.retain(|f| f != "company_employee_count");
    }

    missing
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

/// Field -> provider mapping. High-tier sources never reach this point with a
/// provider list because they deliver pre-enriched data.
fn select_providers(tier: SourceTier, missing_fields: &[String]) -> Vec<String> {
    if tier == SourceTier::High {
        return Vec::new();
    }

    let mut providers = Vec::new();

    if missing_fields.iter().any(|f| f == "company_tech_stack") {
        providers.push("tech_detect".to_string());
    }

    let search_fields = ["company_description", "company_industry", "country"];
    if missing_fields.iter().any(|f| search_fields.contains(&f.as_str())) {
        providers.push("company_search".to_string());
    }

    if missing_fields.iter().any(|f| f == "company_employee_count") {
        providers.push("knowledge_graph".to_string());
    }

    providers
}

fn calculate_priority(
    lead: &Lead,
    missing_fields: &[String],
    tier: SourceTier,
    is_stale: bool,
) -> PlanPriority {
    if lead.enriched_at.is_none() && missing_fields.len() >= 3 {
        return PlanPriority::High;
    }
    if matches!(tier, SourceTier::Low | SourceTier::Unknown) {
        return PlanPriority::High;
    }
    if is_stale {
        return PlanPriority::High;
    }
    if missing_fields.len() >= 2 {
        return PlanPriority::Medium;
    }
    PlanPriority::Low
}

/// When data from this source should next be refreshed.
pub fn next_refresh(source_name: &str, now: DateTime<Utc>) -> DateTime<Utc> {
    let tier = classify_source(source_name);
    now + Duration::days(tier.refresh_interval_days())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::icp::ScoringRules;
    use uuid::Uuid;

    fn bare_lead() -> Lead {
        Lead {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            raw_lead_id: None,
            email: "jane@acme.io".to_string(),
            first_name: None,
            last_name: None,
            phone: None,
            job_title: None,
            company_name: Some("Acme".to_string()),
            company_domain: Some("acme.io".to_string()),
            company_website: None,
            company_employee_count: None,
            company_industry: None,
            company_description: None,
            country: None,
            source: Some("webhook".to_string()),
            tech_stack: Vec::new(),
            enrichment_status: crate::models::EnrichmentStatus::Pending,
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
        }
    }

    fn icp_with_rules(rules: ScoringRules) -> IcpConfig {
        IcpConfig {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            name: "test".to_string(),
            enrichment_enabled: true,
            verification_enabled: true,
            weight_config: Default::default(),
            scoring_rules: rules,
            auto_approve_threshold: 80.0,
            review_threshold: 50.0,
            auto_reject_threshold: Some(30.0),
        }
    }

    #[test]
    fn high_tier_never_enriched_is_skipped() {
        let lead = bare_lead();
        let icp = icp_with_rules(ScoringRules::default());

        let plan = plan(&lead, "apollo", &icp, Utc::now());

        assert!(!plan.should_enrich);
        assert!(plan.reason.contains("pre-enriched"));
        assert_eq!(plan.estimated_cost, 0.0);
    }

    #[test]
    fn high_tier_fresh_data_is_skipped() {
        let mut lead = bare_lead();
        lead.enriched_at = Some(Utc::now() - Duration::days(10));
        let icp = icp_with_rules(ScoringRules::default());

        let plan = plan(&lead, "hunter", &icp, Utc::now());

        assert!(!plan.should_enrich);
        assert!(plan.reason.contains("fresh"));
    }

    #[test]
    fn high_tier_stale_data_is_enriched() {
        let mut lead = bare_lead();
        lead.enriched_at = Some(Utc::now() - Duration::days(120));
        let icp = icp_with_rules(ScoringRules {
            target_industries: vec!["SaaS".to_string()],
            ..Default::default()
        });

        let plan = plan(&lead, "apollo", &icp, Utc::now());

        // stale high-tier data falls through, but high-tier sources map to no
        // providers, so the plan still skips
        assert!(!plan.should_enrich);
        assert_eq!(plan.reason, "No providers available");
    }

    #[test]
    fn unknown_source_with_missing_fields_enriches() {
        let lead = bare_lead();
        let icp = icp_with_rules(ScoringRules {
            target_industries: vec!["SaaS".to_string()],
            required_technologies: vec!["React".to_string()],
            ideal_company_size_min: Some(10),
            ideal_company_size_max: Some(500),
            ..Default::default()
        });

        let plan = plan(&lead, "csv_upload", &icp, Utc::now());

        assert!(plan.should_enrich);
        assert_eq!(plan.priority, PlanPriority::High);
        assert!(plan.providers_to_use.contains(&"tech_detect".to_string()));
        assert!(plan.providers_to_use.contains(&"company_search".to_string()));
        assert!(plan
            .providers_to_use
            .contains(&"knowledge_graph".to_string()));
        assert!((plan.estimated_cost - 0.002).abs() < f64::EPSILON);
    }

    #[test]
    fn tech_stack_dropped_when_icp_has_no_tech_criteria() {
        let lead = bare_lead();
        let icp = icp_with_rules(ScoringRules {
            target_industries: vec!["SaaS".to_string()],
            ..Default::default()
        });

        let plan = plan(&lead, "website_scraper", &icp, Utc::now());

        assert!(plan.should_enrich);
        assert!(!plan
            .fields_to_enrich
            .contains(&"company_tech_stack".to_string()));
        assert!(!plan.providers_to_use.contains(&"tech_detect".to_string()));
    }

    #[test]
    fn employee_count_dropped_when_icp_has_no_size_minimum() {
        let lead = bare_lead();
        let icp = icp_with_rules(ScoringRules {
            target_industries: vec!["SaaS".to_string()],
            ..Default::default()
        });

        let plan = plan(&lead, "webhook", &icp, Utc::now());

        assert!(!plan
            .fields_to_enrich
            .contains(&"company_employee_count".to_string()));
    }

    #[test]
    fn complete_and_fresh_lead_is_skipped() {
        let mut lead = bare_lead();
        lead.company_employee_count = Some("250".to_string());
        lead.company_industry = Some("SaaS".to_string());
        lead.company_description = Some("B2B platform".to_string());
        lead.country = Some("USA".to_string());
        lead.tech_stack = vec!["React".to_string()];
        lead.enriched_at = Some(Utc::now() - Duration::days(5));
        let icp = icp_with_rules(ScoringRules {
            target_industries: vec!["SaaS".to_string()],
            required_technologies: vec!["React".to_string()],
            ideal_company_size_min: Some(10),
            ideal_company_size_max: Some(500),
            ..Default::default()
        });

        let plan = plan(&lead, "linkedin_scraper", &icp, Utc::now());

        assert!(!plan.should_enrich);
        assert_eq!(plan.reason, "All required fields present and data is fresh");
    }

    #[test]
    fn plan_is_deterministic() {
        let lead = bare_lead();
        let icp = icp_with_rules(ScoringRules {
            target_industries: vec!["SaaS".to_string()],
            required_technologies: vec!["React".to_string()],
            ..Default::default()
        });
        let now = Utc::now();

        let a = plan(&lead, "manual", &icp, now);
        let b = plan(&lead, "manual", &icp, now);

        assert_eq!(a.should_enrich, b.should_enrich);
        assert_eq!(a.reason, b.reason);
        assert_eq!(a.providers_to_use, b.providers_to_use);
        assert_eq!(a.fields_to_enrich, b.fields_to_enrich);
        assert_eq!(a.estimated_cost, b.estimated_cost);
        assert_eq!(a.priority, b.priority);
    }

    #[test]
    fn two_missing_fields_is_medium_priority() {
        let mut lead = bare_lead();
        lead.company_employee_count = Some("100".to_string());
        lead.company_description = Some("desc".to_string());
        lead.tech_stack = vec!["React".to_string()];
        // industry and country remain missing
        lead.enriched_at = Some(Utc::now() - Duration::days(5));
        let icp = icp_with_rules(ScoringRules {
            target_industries: vec!["SaaS".to_string()],
            required_technologies: vec!["React".to_string()],
            ideal_company_size_min: Some(10),
            ideal_company_size_max: Some(500),
            ..Default::default()
        });

        let plan = plan(&lead, "linkedin_scraper", &icp, Utc::now());

        assert!(plan.should_enrich);
        assert_eq!(plan.priority, PlanPriority::Medium);
    }

    #[test]
    fn refresh_interval_follows_tier() {
        let now = Utc::now();
        assert_eq!((next_refresh("apollo", now) - now).num_days(), 90);
        assert_eq!((next_refresh("linkedin_scraper", now) - now).num_days(), 60);
        assert_eq!((next_refresh("website_scraper", now) - now).num_days(), 30);
        assert_eq!((next_refresh("somewhere_else", now) - now).num_days(), 30);
    }
}
