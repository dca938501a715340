/// Property-based tests using proptest
/// Tests invariants that should hold for all inputs to the pure stages
use chrono::Utc;
use proptest::prelude::*;
use uuid::Uuid;

use lead_qualify_api::icp::{IcpConfig, ScoringRules, WeightConfig};
use lead_qualify_api::models::{EnrichmentStatus, Lead};
use lead_qualify_api::scoring::score_lead;
use lead_qualify_api::strategy::{classify_source, next_refresh, plan, SourceTier};
use lead_qualify_api::verification::syntax_pass;

fn lead_with(
    job_title: Option<String>,
    company_industry: Option<String>,
    company_employee_count: Option<String>,
    country: Option<String>,
    tech_stack: Vec<String>,
) -> Lead {
    Lead {
        id: Uuid::new_v4(),
        tenant_id: Uuid::new_v4(),
        raw_lead_id: None,
        email: "jane@acme.io".to_string(),
        first_name: None,
        last_name: None,
        phone: None,
        job_title,
        company_name: Some("Acme".to_string()),
        company_domain: Some("acme.io".to_string()),
        company_website: None,
        company_employee_count,
        company_industry,
        company_description: None,
        country,
        source: None,
        tech_stack,
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
    }
}

fn icp_with(rules: ScoringRules) -> IcpConfig {
    IcpConfig {
        id: Uuid::new_v4(),
        tenant_id: Uuid::new_v4(),
        name: "prop-icp".to_string(),
        enrichment_enabled: true,
        verification_enabled: true,
        weight_config: WeightConfig::default(),
        scoring_rules: rules,
        auto_approve_threshold: 80.0,
        review_threshold: 50.0,
        auto_reject_threshold: None,
    }
}

fn arbitrary_rules() -> impl Strategy<Value = ScoringRules> {
    (
        prop::collection::vec("[a-zA-Z ]{1,15}", 0..3),
        prop::option::of(1i64..10_000),
        prop::option::of(1i64..10_000),
        prop::collection::vec("[a-z-]{1,12}", 0..3),
        prop::collection::vec("[a-zA-Z ]{1,12}", 0..3),
        prop::collection::vec("[a-zA-Z]{1,10}", 0..3),
        prop::collection::vec("[a-zA-Z]{1,10}", 0..3),
        prop::collection::vec("[a-zA-Z ]{1,15}", 0..2),
        prop::collection::vec("[a-z]{1,10}", 0..2),
        prop::collection::vec("[a-z]{1,10}", 0..2),
    )
        .prop_map(
            |(
                target_industries,
                size_a,
                size_b,
                target_seniority_levels,
                job_title_keywords,
                required_technologies,
                preferred_technologies,
                target_geographies,
                company_type_keywords,
                excluded_keywords,
            )| {
                // Keep the range well formed when both bounds are present
                let (ideal_company_size_min, ideal_company_size_max) = match (size_a, size_b) {
                    (Some(a), Some(b)) => (Some(a.min(b)), Some(a.max(b))),
                    other => other,
                };
                ScoringRules {
                    target_industries,
                    ideal_company_size_min,
                    ideal_company_size_max,
                    target_seniority_levels,
                    job_title_keywords,
                    required_technologies,
                    preferred_technologies,
                    target_geographies,
                    company_type_keywords,
                    excluded_keywords,
                }
            },
        )
}

fn arbitrary_lead() -> impl Strategy<Value = Lead> {
    (
        prop::option::of("\\PC{0,30}"),
        prop::option::of("\\PC{0,20}"),
        prop::option::of("\\PC{0,12}"),
        prop::option::of("\\PC{0,20}"),
        prop::collection::vec("[a-zA-Z]{1,12}", 0..5),
    )
        .prop_map(|(title, industry, count, country, techs)| {
            lead_with(title, industry, count, country, techs)
        })
}

// Property: scoring never panics and always lands in range
proptest! {
    #[test]
    fn scoring_never_panics_and_stays_in_range(
        lead in arbitrary_lead(),
        rules in arbitrary_rules(),
    ) {
        let result = score_lead(&lead, &icp_with(rules));

        prop_assert!((0.0..=100.0).contains(&result.total_score));
        prop_assert!((0.0..=100.0).contains(&result.confidence));
        for dimension in result.breakdown.values() {
            prop_assert!((0.0..=100.0).contains(&dimension.score));
        }
    }

    #[test]
    fn confidence_reflects_evaluated_dimension_count(
        lead in arbitrary_lead(),
        rules in arbitrary_rules(),
    ) {
        let result = score_lead(&lead, &icp_with(rules));

        // confidence = 100 * evaluated / 6, rounded to two decimals
        let evaluated = result.breakdown.len() as f64;
        let expected = (100.0 * evaluated / 6.0 * 100.0).round() / 100.0;
        prop_assert_eq!(result.confidence, expected);
    }

    #[test]
    fn unconfigured_icp_scores_zero_with_zero_confidence(lead in arbitrary_lead()) {
        let result = score_lead(&lead, &icp_with(ScoringRules::default()));

        prop_assert_eq!(result.total_score, 0.0);
        prop_assert_eq!(result.confidence, 0.0);
        prop_assert!(result.breakdown.is_empty());
    }

    #[test]
    fn employee_count_inside_range_scores_full(
        count in 1i64..5_000,
        spread in 0i64..1_000,
    ) {
        let lead = lead_with(None, None, Some(count.to_string()), None, Vec::new());
        let rules = ScoringRules {
            ideal_company_size_min: Some(count - spread.min(count - 1)),
            ideal_company_size_max: Some(count + spread),
            ..Default::default()
        };

        let result = score_lead(&lead, &icp_with(rules));

        prop_assert_eq!(result.breakdown["company_size"].score, 100.0);
    }

    #[test]
    fn scoring_is_deterministic(
        lead in arbitrary_lead(),
        rules in arbitrary_rules(),
    ) {
        let icp = icp_with(rules);
        let first = score_lead(&lead, &icp);
        let second = score_lead(&lead, &icp);

        prop_assert_eq!(first.total_score, second.total_score);
        prop_assert_eq!(first.confidence, second.confidence);
    }
}

// Property: syntax screening never panics
proptest! {
    #[test]
    fn syntax_pass_never_panics(email in "\\PC*") {
        let pass = syntax_pass(&email);
        prop_assert!(pass.score == 0.0 || pass.score == 30.0);
        prop_assert_eq!(pass.cost, 0.0);
    }

    #[test]
    fn well_formed_addresses_pass_syntax(
        local in "[a-z][a-z0-9._]{0,15}[a-z0-9]",
        domain in "[a-z][a-z0-9-]{0,10}[a-z0-9]",
        tld in "[a-z]{2,6}",
    ) {
        let email = format!("{}@{}.{}", local, domain, tld);
        let pass = syntax_pass(&email);

        // The only legitimate failure for this shape is consecutive dots
        if !pass.passed {
            prop_assert!(email.contains(".."), "rejected: {}", email);
        }
    }

    #[test]
    fn address_without_at_never_passes(email in "[a-z0-9.]{1,30}") {
        prop_assert!(!syntax_pass(&email).passed);
    }
}

// Property: planning is pure and consistent with the tier table
proptest! {
    #[test]
    fn planning_never_panics_and_is_deterministic(
        lead in arbitrary_lead(),
        source in "\\PC{0,20}",
        rules in arbitrary_rules(),
    ) {
        let icp = icp_with(rules);
        let now = Utc::now();
        let first = plan(&lead, &source, &icp, now);
        let second = plan(&lead, &source, &icp, now);

        prop_assert_eq!(first.should_enrich, second.should_enrich);
        prop_assert_eq!(&first.providers_to_use, &second.providers_to_use);
        prop_assert_eq!(&first.reason, &second.reason);
        // A skip decision never carries providers or cost
        if !first.should_enrich {
            prop_assert!(first.providers_to_use.is_empty());
            prop_assert_eq!(first.estimated_cost, 0.0);
        }
        prop_assert!(first.estimated_cost >= 0.0);
    }

    #[test]
    fn high_tier_sources_skip_never_enriched_leads(
        source in prop::sample::select(vec!["apollo", "hunter", "peopledatalabs", "clearbit"]),
        lead in arbitrary_lead(),
        rules in arbitrary_rules(),
    ) {
        prop_assert_eq!(classify_source(source), SourceTier::High);

        let decision = plan(&lead, source, &icp_with(rules), Utc::now());

        prop_assert!(!decision.should_enrich);
    }

    #[test]
    fn refresh_window_always_matches_the_source_tier(source in "[a-z_]{1,20}") {
        let tier = classify_source(&source);
        let now = Utc::now();
        let refresh = next_refresh(&source, now);
        let days = (refresh - now).num_days();

        prop_assert_eq!(days, tier.refresh_interval_days());
    }
}
