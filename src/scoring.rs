//! ICP fit scoring engine.
//!
//! Evaluates a lead against up to six dimensions (industry, company size,
//! seniority, tech stack, geography, company type). A dimension is evaluated
//! only when the ICP configures criteria for it; unconfigured dimensions are
//! excluded from both the weighted total and the confidence figure, so a
//! sparse ICP is not penalized for what it never asked about.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::icp::IcpConfig;
use crate::models::Lead;

const DIMENSION_COUNT: usize = 6;

/// One evaluated dimension's contribution. `weight` is informational, it does
/// not change the total.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionScore {
    pub score: f64,
    pub weight: u32,
    pub detail: String,
}

/// Full scoring output: total, confidence and per-dimension breakdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreResult {
    pub total_score: f64,
    pub confidence: f64,
    pub breakdown: BTreeMap<String, DimensionScore>,
}

/// Scores a lead against an ICP. Pure: same inputs, same result.
pub fn score_lead(lead: &Lead, icp: &IcpConfig) -> ScoreResult {
    let rules = &icp.scoring_rules;
    let weights = &icp.weight_config;
    let mut breakdown = BTreeMap::new();

    if rules.has_industry_criteria() {
        breakdown.insert(
            "industry".to_string(),
            with_weight(score_industry(lead, icp), weights.industry),
        );
    }
    if rules.has_size_criteria() {
        breakdown.insert(
            "company_size".to_string(),
            with_weight(score_company_size(lead, icp), weights.company_size),
        );
    }
    if rules.has_seniority_criteria() {
        breakdown.insert(
            "seniority".to_string(),
            with_weight(score_seniority(lead, icp), weights.seniority),
        );
    }
    if rules.has_tech_criteria() {
        breakdown.insert(
            "tech_stack".to_string(),
            with_weight(score_tech_stack(lead, icp), weights.tech_stack),
        );
    }
    if rules.has_geography_criteria() {
        breakdown.insert(
            "geography".to_string(),
            with_weight(score_geography(lead, icp), weights.geography),
        );
    }
    if rules.has_company_type_criteria() {
        breakdown.insert(
            "company_type".to_string(),
            with_weight(score_company_type(lead, icp), weights.company_type),
        );
    }

    // Every evaluated dimension counts equally toward the total; the weights
    // are carried in the breakdown for reporting only.
    let sub_total: f64 = breakdown.values().map(|d| d.score).sum();
    let max_possible = 100.0 * breakdown.len() as f64;

    let total_score = if max_possible > 0.0 {
        round2(100.0 * sub_total / max_possible)
    } else {
        0.0
    };
    let confidence = round2(100.0 * breakdown.len() as f64 / DIMENSION_COUNT as f64);

    tracing::debug!(
        "Scored {} against ICP '{}': {} (confidence {})",
        lead.email,
        icp.name,
        total_score,
        confidence
    );

    ScoreResult {
        total_score,
        confidence,
        breakdown,
    }
}

fn with_weight((score, detail): (f64, String), weight: u32) -> DimensionScore {
    DimensionScore {
        score: round2(score),
        weight,
        detail,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn score_industry(lead: &Lead, icp: &IcpConfig) -> (f64, String) {
    let industry = match lead.company_industry.as_deref() {
        Some(i) if !i.trim().is_empty() => i.to_lowercase(),
        _ => return (40.0, "no industry data".to_string()),
    };

    let matched = icp.scoring_rules.target_industries.iter().any(|target| {
        let target = target.to_lowercase();
        industry.contains(&target) || target.contains(&industry)
    });

    if matched {
        (100.0, format!("industry '{}' matches target", industry))
    } else {
        (40.0, format!("industry '{}' not in targets", industry))
    }
}

fn score_company_size(lead: &Lead, icp: &IcpConfig) -> (f64, String) {
    let rules = &icp.scoring_rules;
    // has_size_criteria guarantees both bounds
    let min = rules.ideal_company_size_min.unwrap_or(0);
    let max = rules.ideal_company_size_max.unwrap_or(i64::MAX);

    let count = match lead
        .company_employee_count
        .as_deref()
        .and_then(parse_employee_count)
    {
        Some(c) => c,
        None => return (0.0, "employee count missing or unparsable".to_string()),
    };

    if count >= min && count <= max {
        (100.0, format!("{} within ideal range {}-{}", count, min, max))
    } else if count < min {
        let score = if min > 0 {
            80.0 * count as f64 / min as f64
        } else {
            0.0
        };
        (score, format!("{} below minimum {}", count, min))
    } else {
        let score = if count > 0 {
            80.0 * max as f64 / count as f64
        } else {
            0.0
        };
        (score, format!("{} above maximum {}", count, max))
    }
}

/// Parses formats sources actually deliver: "250", "8,100", "50-200", "500+".
fn parse_employee_count(raw: &str) -> Option<i64> {
    let cleaned = raw.trim().replace(',', "");
    if cleaned.is_empty() {
        return None;
    }
    let first_part = cleaned
        .split('-')
        .next()
        .unwrap_or(&cleaned)
        .trim_end_matches('+')
        .trim();
    first_part.parse::<i64>().ok().filter(|c| *c >= 0)
}

fn score_seniority(lead: &Lead, icp: &IcpConfig) -> (f64, String) {
    let rules = &icp.scoring_rules;
    let title = match lead.job_title.as_deref() {
        Some(t) if !t.trim().is_empty() => t.to_lowercase(),
        _ => return (20.0, "no job title".to_string()),
    };

    if rules
        .job_title_keywords
        .iter()
        .any(|kw| title.contains(&kw.to_lowercase()))
    {
        return (100.0, format!("title '{}' matches keyword", title));
    }

    // Derive a single tier from the ordered buckets, then compare. "Senior
    // Manager" is a manager, not a senior, because manager ranks first.
    let tier = derive_seniority_tier(&title);

    if let Some(tier) = tier {
        if rules
            .target_seniority_levels
            .iter()
            .any(|level| normalize_level(level) == tier)
        {
            return (90.0, format!("title '{}' matches target seniority", title));
        }
    }

    match tier {
        Some("c-level") | Some("vp") => {
            (80.0, format!("title '{}' is executive-level", title))
        }
        Some("director") => (60.0, format!("title '{}' is director-level", title)),
        Some("manager") => (40.0, format!("title '{}' is manager-level", title)),
        _ => (20.0, format!("title '{}' below target seniority", title)),
    }
}

/// First matching tier wins, highest seniority first.
fn derive_seniority_tier(title: &str) -> Option<&'static str> {
    ["c-level", "vp", "director", "manager", "senior", "junior"]
        .into_iter()
        .find(|tier| tier_keywords(tier).iter().any(|kw| title.contains(kw)))
}

fn normalize_level(level: &str) -> String {
    match level.to_lowercase().as_str() {
        "c_level" | "clevel" => "c-level".to_string(),
        other => other.to_string(),
    }
}

fn tier_keywords(level: &str) -> &'static [&'static str] {
    match level.to_lowercase().as_str() {
        "c-level" | "c_level" | "clevel" => {
            &["ceo", "cto", "cfo", "coo", "president", "founder", "chief"]
        }
        "vp" => &["vp", "vice president"],
        "director" => &["director", "head of"],
        "manager" => &["manager", "lead"],
        "senior" => &["senior", "sr"],
        "junior" => &["junior", "jr", "associate"],
        _ => &[],
    }
}

fn score_tech_stack(lead: &Lead, icp: &IcpConfig) -> (f64, String) {
    let rules = &icp.scoring_rules;
    let stack: Vec<String> = lead.tech_stack.iter().map(|t| t.to_lowercase()).collect();

    let matches_stack =
        |tech: &String| -> bool { stack.iter().any(|s| s.contains(&tech.to_lowercase())) };

    if !rules.required_technologies.is_empty() {
        let matched = rules
            .required_technologies
            .iter()
            .filter(|t| matches_stack(t))
            .count();
        let ratio = matched as f64 / rules.required_technologies.len() as f64;
        if ratio < 1.0 {
            return (
                50.0 * ratio,
                format!(
                    "{}/{} required technologies present",
                    matched,
                    rules.required_technologies.len()
                ),
            );
        }
    }

    let preferred_ratio = if rules.preferred_technologies.is_empty() {
        1.0
    } else {
        let matched = rules
            .preferred_technologies
            .iter()
            .filter(|t| matches_stack(t))
            .count();
        matched as f64 / rules.preferred_technologies.len() as f64
    };

    (
        50.0 + 50.0 * preferred_ratio,
        "all required technologies present".to_string(),
    )
}

fn score_geography(lead: &Lead, icp: &IcpConfig) -> (f64, String) {
    let country = match lead.country.as_deref() {
        Some(c) if !c.trim().is_empty() => c.to_lowercase(),
        _ => return (30.0, "no country data".to_string()),
    };

    // Substring match: "USA" targets cover values like "USA (California)"
    let matched = icp
        .scoring_rules
        .target_geographies
        .iter()
        .any(|geo| country.contains(&geo.to_lowercase()));

    if matched {
        (100.0, format!("country '{}' in targets", country))
    } else {
        (30.0, format!("country '{}' not in targets", country))
    }
}

fn score_company_type(lead: &Lead, icp: &IcpConfig) -> (f64, String) {
    let rules = &icp.scoring_rules;
    let text = format!(
        "{} {}",
        lead.company_description.as_deref().unwrap_or(""),
        lead.company_name.as_deref().unwrap_or("")
    )
    .to_lowercase();

    if rules
        .excluded_keywords
        .iter()
        .any(|kw| text.contains(&kw.to_lowercase()))
    {
        return (20.0, "excluded keyword present".to_string());
    }

    if !rules.company_type_keywords.is_empty() {
        let matched = rules
            .company_type_keywords
            .iter()
            .filter(|kw| text.contains(&kw.to_lowercase()))
            .count();
        if matched > 0 {
            let ratio = matched as f64 / rules.company_type_keywords.len() as f64;
            return (
                50.0 + 50.0 * ratio,
                format!(
                    "{}/{} company type keywords present",
                    matched,
                    rules.company_type_keywords.len()
                ),
            );
        }
    }

    (40.0, "no company type signal".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::icp::{ScoringRules, WeightConfig};
    use chrono::Utc;
    use uuid::Uuid;

    fn lead() -> Lead {
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
            source: None,
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

    fn icp(rules: ScoringRules) -> IcpConfig {
        IcpConfig {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            name: "test".to_string(),
            enrichment_enabled: true,
            verification_enabled: true,
            weight_config: WeightConfig::default(),
            scoring_rules: rules,
            auto_approve_threshold: 80.0,
            review_threshold: 50.0,
            auto_reject_threshold: None,
        }
    }

    #[test]
    fn unconfigured_dimensions_are_excluded() {
        let mut l = lead();
        l.company_industry = Some("SaaS".to_string());
        let icp = icp(ScoringRules {
            target_industries: vec!["SaaS".to_string()],
            ..Default::default()
        });

        let result = score_lead(&l, &icp);

        assert_eq!(result.breakdown.len(), 1);
        assert_eq!(result.total_score, 100.0);
        // one of six dimensions evaluated
        assert_eq!(result.confidence, 16.67);
    }

    #[test]
    fn dimensions_count_equally_regardless_of_weight() {
        let mut l = lead();
        l.company_industry = Some("SaaS".to_string());
        l.country = Some("Brazil".to_string());
        // industry weight 20, geography weight 10: the total ignores both
        let icp = icp(ScoringRules {
            target_industries: vec!["SaaS".to_string()],
            target_geographies: vec!["Germany".to_string()],
            ..Default::default()
        });

        let result = score_lead(&l, &icp);

        // (100 + 30) / 200
        assert_eq!(result.total_score, 65.0);
        assert_eq!(result.breakdown["industry"].weight, 20);
        assert_eq!(result.breakdown["geography"].weight, 10);
    }

    #[test]
    fn two_dimensions_give_confidence_33() {
        let mut l = lead();
        l.company_industry = Some("SaaS".to_string());
        l.country = Some("USA".to_string());
        let icp = icp(ScoringRules {
            target_industries: vec!["SaaS".to_string()],
            target_geographies: vec!["USA".to_string()],
            ..Default::default()
        });

        let result = score_lead(&l, &icp);

        assert_eq!(result.confidence, 33.33);
        assert_eq!(result.total_score, 100.0);
    }

    #[test]
    fn comma_formatted_employee_count_in_range_scores_100() {
        let mut l = lead();
        l.company_employee_count = Some("8,100".to_string());
        let icp = icp(ScoringRules {
            ideal_company_size_min: Some(100),
            ideal_company_size_max: Some(10_000),
            ..Default::default()
        });

        let result = score_lead(&l, &icp);

        assert_eq!(result.breakdown["company_size"].score, 100.0);
    }

    #[test]
    fn size_bounds_are_inclusive() {
        let icp = icp(ScoringRules {
            ideal_company_size_min: Some(100),
            ideal_company_size_max: Some(500),
            ..Default::default()
        });

        for count in ["100", "500"] {
            let mut l = lead();
            l.company_employee_count = Some(count.to_string());
            let result = score_lead(&l, &icp);
            assert_eq!(result.breakdown["company_size"].score, 100.0);
        }
    }

    #[test]
    fn size_below_minimum_scales_toward_80() {
        let mut l = lead();
        l.company_employee_count = Some("50".to_string());
        let icp = icp(ScoringRules {
            ideal_company_size_min: Some(100),
            ideal_company_size_max: Some(500),
            ..Default::default()
        });

        let result = score_lead(&l, &icp);

        assert_eq!(result.breakdown["company_size"].score, 40.0);
    }

    #[test]
    fn size_above_maximum_scales_down() {
        let mut l = lead();
        l.company_employee_count = Some("1000".to_string());
        let icp = icp(ScoringRules {
            ideal_company_size_min: Some(100),
            ideal_company_size_max: Some(500),
            ..Default::default()
        });

        let result = score_lead(&l, &icp);

        assert_eq!(result.breakdown["company_size"].score, 40.0);
    }

    #[test]
    fn missing_employee_count_scores_zero_but_counts() {
        let l = lead();
        let icp = icp(ScoringRules {
            ideal_company_size_min: Some(100),
            ideal_company_size_max: Some(500),
            ..Default::default()
        });

        let result = score_lead(&l, &icp);

        assert_eq!(result.breakdown["company_size"].score, 0.0);
        assert_eq!(result.confidence, 16.67);
        assert_eq!(result.total_score, 0.0);
    }

    #[test]
    fn half_configured_size_range_is_not_evaluated() {
        let mut l = lead();
        l.company_employee_count = Some("250".to_string());
        let icp = icp(ScoringRules {
            ideal_company_size_min: Some(100),
            ..Default::default()
        });

        let result = score_lead(&l, &icp);

        assert!(result.breakdown.is_empty());
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn title_keyword_beats_seniority_ladder() {
        let mut l = lead();
        l.job_title = Some("VP Engineering".to_string());
        let icp = icp(ScoringRules {
            job_title_keywords: vec!["engineering".to_string()],
            ..Default::default()
        });

        let result = score_lead(&l, &icp);

        assert_eq!(result.breakdown["seniority"].score, 100.0);
    }

    #[test]
    fn seniority_ladder_grades_titles() {
        let cases = [
            ("Chief Revenue Officer", 80.0),
            ("VP of Sales", 80.0),
            ("Director of Marketing", 60.0),
            ("Head of Growth", 60.0),
            ("Engineering Manager", 40.0),
            ("Accountant", 20.0),
        ];
        let icp = icp(ScoringRules {
            target_seniority_levels: vec!["senior".to_string()],
            ..Default::default()
        });

        for (title, expected) in cases {
            let mut l = lead();
            l.job_title = Some(title.to_string());
            let result = score_lead(&l, &icp);
            assert_eq!(
                result.breakdown["seniority"].score, expected,
                "title: {}",
                title
            );
        }
    }

    #[test]
    fn mixed_title_takes_the_highest_tier_only() {
        // "Senior Manager" derives the manager tier, so a "senior" target
        // does not match it
        let mut l = lead();
        l.job_title = Some("Senior Manager".to_string());
        let icp = icp(ScoringRules {
            target_seniority_levels: vec!["senior".to_string()],
            ..Default::default()
        });

        let result = score_lead(&l, &icp);

        assert_eq!(result.breakdown["seniority"].score, 40.0);
    }

    #[test]
    fn target_seniority_tier_scores_90() {
        let mut l = lead();
        l.job_title = Some("Senior Software Engineer".to_string());
        let icp = icp(ScoringRules {
            target_seniority_levels: vec!["senior".to_string()],
            ..Default::default()
        });

        let result = score_lead(&l, &icp);

        assert_eq!(result.breakdown["seniority"].score, 90.0);
    }

    #[test]
    fn partial_required_tech_caps_at_50() {
        let mut l = lead();
        l.tech_stack = vec!["React".to_string()];
        let icp = icp(ScoringRules {
            required_technologies: vec!["React".to_string(), "Postgres".to_string()],
            preferred_technologies: vec!["Kubernetes".to_string()],
            ..Default::default()
        });

        let result = score_lead(&l, &icp);

        assert_eq!(result.breakdown["tech_stack"].score, 25.0);
    }

    #[test]
    fn full_required_plus_preferred_reaches_100() {
        let mut l = lead();
        l.tech_stack = vec!["React".to_string(), "Kubernetes".to_string()];
        let icp = icp(ScoringRules {
            required_technologies: vec!["React".to_string()],
            preferred_technologies: vec!["Kubernetes".to_string()],
            ..Default::default()
        });

        let result = score_lead(&l, &icp);

        assert_eq!(result.breakdown["tech_stack"].score, 100.0);
    }

    #[test]
    fn excluded_keyword_dominates_company_type() {
        let mut l = lead();
        l.company_description = Some("A non-profit B2B SaaS platform".to_string());
        let icp = icp(ScoringRules {
            company_type_keywords: vec!["b2b".to_string(), "saas".to_string()],
            excluded_keywords: vec!["non-profit".to_string()],
            ..Default::default()
        });

        let result = score_lead(&l, &icp);

        assert_eq!(result.breakdown["company_type"].score, 20.0);
    }

    #[test]
    fn company_type_partial_match_scales() {
        let mut l = lead();
        l.company_description = Some("A B2B platform".to_string());
        let icp = icp(ScoringRules {
            company_type_keywords: vec!["b2b".to_string(), "saas".to_string()],
            ..Default::default()
        });

        let result = score_lead(&l, &icp);

        assert_eq!(result.breakdown["company_type"].score, 75.0);
    }

    #[test]
    fn no_company_type_signal_is_neutral() {
        let mut l = lead();
        l.company_description = Some("We sell widgets".to_string());
        let icp = icp(ScoringRules {
            company_type_keywords: vec!["saas".to_string()],
            ..Default::default()
        });

        let result = score_lead(&l, &icp);

        assert_eq!(result.breakdown["company_type"].score, 40.0);
    }

    #[test]
    fn geography_matches_substrings_case_insensitively() {
        let icp = icp(ScoringRules {
            target_geographies: vec!["USA".to_string()],
            ..Default::default()
        });

        for country in ["usa", "USA (California)"] {
            let mut l = lead();
            l.country = Some(country.to_string());
            let result = score_lead(&l, &icp);
            assert_eq!(
                result.breakdown["geography"].score, 100.0,
                "country: {}",
                country
            );
        }

        let mut l = lead();
        l.country = Some("Canada".to_string());
        let result = score_lead(&l, &icp);
        assert_eq!(result.breakdown["geography"].score, 30.0);
    }

    #[test]
    fn scoring_is_deterministic() {
        let mut l = lead();
        l.company_industry = Some("SaaS".to_string());
        l.job_title = Some("CTO".to_string());
        l.company_employee_count = Some("250".to_string());
        l.country = Some("USA".to_string());
        l.tech_stack = vec!["React".to_string()];
        let icp = icp(ScoringRules {
            target_industries: vec!["SaaS".to_string()],
            ideal_company_size_min: Some(100),
            ideal_company_size_max: Some(500),
            target_seniority_levels: vec!["c-level".to_string()],
            required_technologies: vec!["React".to_string()],
            target_geographies: vec!["USA".to_string()],
            company_type_keywords: vec!["saas".to_string()],
            ..Default::default()
        });

        let a = score_lead(&l, &icp);
        let b = score_lead(&l, &icp);

        assert_eq!(a.total_score, b.total_score);
        assert_eq!(a.confidence, b.confidence);
    }

    #[test]
    fn parse_employee_count_formats() {
        assert_eq!(parse_employee_count("250"), Some(250));
        assert_eq!(parse_employee_count("8,100"), Some(8100));
        assert_eq!(parse_employee_count("50-200"), Some(50));
        assert_eq!(parse_employee_count("500+"), Some(500));
        assert_eq!(parse_employee_count("unknown"), None);
        assert_eq!(parse_employee_count(""), None);
    }
}
