use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::PipelineError;

/// Canonical, strongly-typed ICP configuration.
///
/// Built once at the pipeline's entry boundary from the caller-supplied plain
/// data and treated as immutable for the whole run. Per-dimension criteria are
/// explicitly optional: an absent field is the sole signal that the dimension
/// is not evaluated by the scoring engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IcpConfig {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    #[serde(default = "default_true")]
    pub enrichment_enabled: bool,
    #[serde(default = "default_true")]
    pub verification_enabled: bool,
    #[serde(default)]
    pub weight_config: WeightConfig,
    #[serde(default)]
    pub scoring_rules: ScoringRules,
    #[serde(default = "default_auto_approve")]
    pub auto_approve_threshold: f64,
    #[serde(default = "default_review")]
    pub review_threshold: f64,
    /// `None` disables the auto-reject short-circuit entirely.
    #[serde(default)]
    pub auto_reject_threshold: Option<f64>,
}

fn default_true() -> bool {
    true
}

fn default_auto_approve() -> f64 {
    80.0
}

fn default_review() -> f64 {
    50.0
}

impl IcpConfig {
    /// Validates threshold ordering before any stage runs.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !(0.0..=100.0).contains(&self.auto_approve_threshold) {
            return Err(PipelineError::Configuration(format!(
                "auto_approve_threshold {} outside 0-100",
                self.auto_approve_threshold
            )));
        }
        if !(0.0..=100.0).contains(&self.review_threshold) {
            return Err(PipelineError::Configuration(format!(
                "review_threshold {} outside 0-100",
                self.review_threshold
            )));
        }
        if let Some(reject) = self.auto_reject_threshold {
            if !(0.0..=100.0).contains(&reject) {
                return Err(PipelineError::Configuration(format!(
                    "auto_reject_threshold {} outside 0-100",
                    reject
                )));
            }
        }
        Ok(())
    }
}

/// Per-dimension importance weights, recorded alongside each dimension's
/// breakdown for reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightConfig {
    pub industry: u32,
    pub company_size: u32,
    pub seniority: u32,
    pub tech_stack: u32,
    pub geography: u32,
    pub company_type: u32,
}

impl Default for WeightConfig {
    fn default() -> Self {
        Self {
            industry: 20,
            company_size: 15,
            seniority: 25,
            tech_stack: 20,
            geography: 10,
            company_type: 10,
        }
    }
}

/// Target criteria per scoring dimension. Every field optional; an empty list
/// is normalized to "not configured".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoringRules {
    #[serde(default)]
    pub target_industries: Vec<String>,
    #[serde(default)]
    pub ideal_company_size_min: Option<i64>,
    #[serde(default)]
    pub ideal_company_size_max: Option<i64>,
    #[serde(default)]
    pub target_seniority_levels: Vec<String>,
    #[serde(default)]
    pub job_title_keywords: Vec<String>,
    #[serde(default)]
    pub required_technologies: Vec<String>,
    #[serde(default)]
    pub preferred_technologies: Vec<String>,
    #[serde(default)]
    pub target_geographies: Vec<String>,
    #[serde(default)]
    pub company_type_keywords: Vec<String>,
    #[serde(default)]
    pub excluded_keywords: Vec<String>,
}

impl ScoringRules {
    pub fn has_industry_criteria(&self) -> bool {
        !self.target_industries.is_empty()
    }

    /// Size bounds must both be present for the dimension to be evaluated;
    /// a half-configured range is treated as not configured.
    pub fn has_size_criteria(&self) -> bool {
        self.ideal_company_size_min.is_some() && self.ideal_company_size_max.is_some()
    }

    pub fn has_seniority_criteria(&self) -> bool {
        !self.target_seniority_levels.is_empty() || !self.job_title_keywords.is_empty()
    }

    pub fn has_tech_criteria(&self) -> bool {
        !self.required_technologies.is_empty() || !self.preferred_technologies.is_empty()
    }

    pub fn has_geography_criteria(&self) -> bool {
        !self.target_geographies.is_empty()
    }

    pub fn has_company_type_criteria(&self) -> bool {
        !self.company_type_keywords.is_empty() || !self.excluded_keywords.is_empty()
    }
}
