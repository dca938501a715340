//! External provider clients.
//!
//! Three enrichment providers behind a common trait (tech detection, company
//! search, knowledge graph) and the paid mailbox validation client used by
//! pass 3 of the verification cascade. Enrichment providers fail soft: a dead
//! provider returns an error the waterfall logs and skips, never aborting the
//! lead's run.

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde_json::{Map, Value};
use std::sync::OnceLock;
use std::time::Duration;

use crate::circuit_breaker::{create_mailbox_circuit_breaker, MailboxCircuitBreaker};
use crate::config::Config;
use crate::errors::PipelineError;
use crate::models::Lead;
use crate::verification::{
    MailboxClassification, MailboxFailure, MailboxValidator, MailboxVerdict,
};

/// Common interface over enrichment data providers.
///
/// A provider returns a map of lead field names to values; an empty map means
/// the provider had nothing for this company, which is not an error.
#[async_trait]
pub trait EnrichmentProvider: Send + Sync {
    fn name(&self) -> &'static str;
    fn cost_per_call(&self) -> f64;
    async fn enrich(&self, lead: &Lead) -> Result<Map<String, Value>, PipelineError>;
}

// ============ Tech detection ============

/// Detects the technology stack running on the company's website.
pub struct TechDetectClient {
    client: Client,
    base_url: String,
}

impl TechDetectClient {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            base_url: config.tech_detect_api_url.clone(),
        }
    }
}

#[async_trait]
impl EnrichmentProvider for TechDetectClient {
    fn name(&self) -> &'static str {
        "tech_detect"
    }

    fn cost_per_call(&self) -> f64 {
        0.0
    }

    async fn enrich(&self, lead: &Lead) -> Result<Map<String, Value>, PipelineError> {
        let domain = match lead.company_domain.as_deref() {
            Some(d) if !d.trim().is_empty() => d,
            _ => return Ok(Map::new()),
        };

        tracing::info!("Detecting tech stack for {}", domain);

        let url = reqwest::Url::parse_with_params(
            &format!("{}/lookup", self.base_url),
            &[("urls", format!("https://{}", domain))],
        )
        .map_err(|e| PipelineError::EnrichmentProvider(format!("Failed to build URL: {}", e)))?;

        let response = self
            .client
            .get(url)
            .timeout(Duration::from_secs(15))
            .send()
            .await
            .map_err(|e| {
                PipelineError::EnrichmentProvider(format!("Tech detection request failed: {}", e))
            })?;

        if !response.status().is_success() {
            return Err(PipelineError::EnrichmentProvider(format!(
                "Tech detection returned status {}",
                response.status()
            )));
        }

        let body: Value = response.json().await.map_err(|e| {
            PipelineError::EnrichmentProvider(format!("Failed to parse tech detection response: {}", e))
        })?;

        let technologies: Vec<Value> = body
            .as_array()
            .and_then(|entries| entries.first())
            .and_then(|entry| entry.get("technologies"))
            .and_then(Value::as_array)
            .map(|techs| {
                techs
                    .iter()
                    .filter_map(|t| t.get("name").and_then(Value::as_str))
                    .map(|name| Value::String(name.to_string()))
                    .collect()
            })
            .unwrap_or_default();

        let mut fields = Map::new();
        if !technologies.is_empty() {
            fields.insert("company_tech_stack".to_string(), Value::Array(technologies));
        }
        Ok(fields)
    }
}

// ============ Company search ============

/// Pulls the company's knowledge panel from a search API: description,
/// industry and headquarters country.
pub struct CompanySearchClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl CompanySearchClient {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            base_url: config.company_search_api_url.clone(),
            api_key: config.company_search_api_key.clone(),
        }
    }
}

#[async_trait]
impl EnrichmentProvider for CompanySearchClient {
    fn name(&self) -> &'static str {
        "company_search"
    }

    fn cost_per_call(&self) -> f64 {
        0.002
    }

    async fn enrich(&self, lead: &Lead) -> Result<Map<String, Value>, PipelineError> {
        let api_key = match self.api_key.as_deref() {
            Some(key) => key,
            None => return Ok(Map::new()),
        };
        let company = match lead.company_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => return Ok(Map::new()),
        };

        tracing::info!("Searching company info for {}", company);

        let url = reqwest::Url::parse_with_params(
            &format!("{}/search", self.base_url),
            &[
                ("api_key", api_key),
                ("q", &format!("{} company", company)),
                ("num", "1"),
                ("engine", "google"),
            ],
        )
        .map_err(|e| PipelineError::EnrichmentProvider(format!("Failed to build URL: {}", e)))?;

        let response = self
            .client
            .get(url)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| {
                PipelineError::EnrichmentProvider(format!("Company search request failed: {}", e))
            })?;

        if !response.status().is_success() {
            return Err(PipelineError::EnrichmentProvider(format!(
                "Company search returned status {}",
                response.status()
            )));
        }

        let body: Value = response.json().await.map_err(|e| {
            PipelineError::EnrichmentProvider(format!("Failed to parse search response: {}", e))
        })?;

        let mut fields = Map::new();
        if let Some(kg) = body.get("knowledge_graph").and_then(Value::as_object) {
            if let Some(description) = kg.get("description").and_then(Value::as_str) {
                fields.insert(
                    "company_description".to_string(),
                    Value::String(description.to_string()),
                );
            }
            if let Some(company_type) = kg.get("type").and_then(Value::as_str) {
                fields.insert(
                    "company_industry".to_string(),
                    Value::String(company_type.to_string()),
                );
            }
            if let Some(headquarters) = kg.get("headquarters").and_then(Value::as_str) {
                fields.insert(
                    "country".to_string(),
                    Value::String(headquarters.to_string()),
                );
            }
        }
        Ok(fields)
    }
}

// ============ Knowledge graph ============

/// Extracts the employee count from a knowledge graph entity description.
pub struct KnowledgeGraphClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl KnowledgeGraphClient {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            base_url: config.knowledge_graph_api_url.clone(),
            api_key: config.knowledge_graph_api_key.clone(),
        }
    }
}

#[async_trait]
impl EnrichmentProvider for KnowledgeGraphClient {
    fn name(&self) -> &'static str {
        "knowledge_graph"
    }

    fn cost_per_call(&self) -> f64 {
        0.0
    }

    async fn enrich(&self, lead: &Lead) -> Result<Map<String, Value>, PipelineError> {
        let api_key = match self.api_key.as_deref() {
            Some(key) => key,
            None => return Ok(Map::new()),
        };
        let company = match lead.company_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => return Ok(Map::new()),
        };

        tracing::info!("Querying knowledge graph for {}", company);

        let url = reqwest::Url::parse_with_params(
            &format!("{}/entities:search", self.base_url),
            &[
                ("query", company),
                ("key", api_key),
                ("limit", "1"),
                ("types", "Organization"),
            ],
        )
        .map_err(|e| PipelineError::EnrichmentProvider(format!("Failed to build URL: {}", e)))?;

        let response = self
            .client
            .get(url)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| {
                PipelineError::EnrichmentProvider(format!("Knowledge graph request failed: {}", e))
            })?;

        if !response.status().is_success() {
            return Err(PipelineError::EnrichmentProvider(format!(
                "Knowledge graph returned status {}",
                response.status()
            )));
        }

        let body: Value = response.json().await.map_err(|e| {
            PipelineError::EnrichmentProvider(format!(
                "Failed to parse knowledge graph response: {}",
                e
            ))
        })?;

        let article = body
            .get("itemListElement")
            .and_then(Value::as_array)
            .and_then(|items| items.first())
            .and_then(|item| item.pointer("/result/detailedDescription/articleBody"))
            .and_then(Value::as_str)
            .unwrap_or("");

        let mut fields = Map::new();
        if let Some(count) = extract_employee_count(article) {
            fields.insert(
                "company_employee_count".to_string(),
                Value::String(count.to_string()),
            );
        }
        Ok(fields)
    }
}

/// Pulls an employee count out of prose like "has over 10,000 employees".
fn extract_employee_count(text: &str) -> Option<i64> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(
            r"(?i)(\d{1,3}(?:,\d{3})+|\d{3,})\s*\+?\s*(?:full[- ]time\s+)?(?:employees|staff|people|workers)",
        )
        .expect("employee count regex is valid")
    });

    re.captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().replace(',', "").parse::<i64>().ok())
}

// ============ Mailbox validation ============

/// Client for the paid mailbox validation provider, wrapped in a circuit
/// breaker so a provider outage fails fast instead of burning the batch's
/// time and budget.
pub struct MailboxValidationClient {
    client: Client,
    base_url: String,
    username: String,
    password: String,
    breaker: MailboxCircuitBreaker,
}

impl MailboxValidationClient {
    /// Returns `None` when credentials are not configured; the verification
    /// cascade then terminates after pass 2.
    pub fn from_config(config: &Config) -> Option<Self> {
        let (username, password) = config.mailbox_credentials()?;
        Some(Self {
            client: Client::new(),
            base_url: config.mailbox_api_url.clone(),
            username: username.to_string(),
            password: password.to_string(),
            breaker: create_mailbox_circuit_breaker(),
        })
    }

    async fn submit(&self, email: &str) -> Result<MailboxVerdict, MailboxFailure> {
        // Cost is charged from the moment the request is submitted, even when
        // the provider errors or times out.
        let charged = |reason: String| MailboxFailure {
            reason,
            cost: 0.005,
        };

        let response = self
            .client
            .post(format!("{}/email-validations", self.base_url))
            .basic_auth(&self.username, Some(&self.password))
            .query(&[("waitTime", "120s")])
            .json(&serde_json::json!({
                "entries": [{"inputData": email}],
                "quality": "Standard",
                "deduplication": "Off"
            }))
            .timeout(Duration::from_secs(130))
            .send()
            .await
            .map_err(|e| charged(format!("mailbox validation request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(charged(format!(
                "mailbox validation returned status {}",
                response.status()
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| charged(format!("failed to parse mailbox validation response: {}", e)))?;

        let overview_status = body
            .pointer("/overview/status")
            .and_then(Value::as_str)
            .unwrap_or("");
        if overview_status != "Completed" {
            return Err(charged(format!(
                "mailbox validation not completed: {}",
                overview_status
            )));
        }

        let entry = body
            .pointer("/entries/data/0")
            .ok_or_else(|| charged("no entries in mailbox validation response".to_string()))?;

        let classification = match entry.get("classification").and_then(Value::as_str) {
            Some("Deliverable") => MailboxClassification::Deliverable,
            Some("Risky") => MailboxClassification::Risky,
            Some("Undeliverable") => MailboxClassification::Undeliverable,
            _ => MailboxClassification::Unknown,
        };
        let is_role_account = entry
            .get("isRoleAccount")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let is_catch_all = entry
            .get("isCatchAll")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        Ok(MailboxVerdict {
            classification,
            is_role_account,
            is_catch_all,
        })
    }
}

#[async_trait]
impl MailboxValidator for MailboxValidationClient {
    async fn validate_mailbox(&self, email: &str) -> Result<MailboxVerdict, MailboxFailure> {
        use failsafe::futures::CircuitBreaker;

        match self.breaker.call(self.submit(email)).await {
            Ok(verdict) => Ok(verdict),
            Err(failsafe::Error::Inner(failure)) => Err(failure),
            Err(failsafe::Error::Rejected) => {
                tracing::warn!("Mailbox validation circuit open, skipping {}", email);
                Err(MailboxFailure {
                    reason: "circuit breaker open, request not submitted".to_string(),
                    cost: 0.0,
                })
            }
        }
    }
}
