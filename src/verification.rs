//! Three-pass email verification cascade.
//!
//! Pass 1 (syntax, free) gates pass 2 (DNS/MX, free) gates pass 3 (mailbox
//! validation, paid). Each pass contributes a bounded confidence share:
//! syntax 0-30, domain 0-30, mailbox 0-40. Early failures terminate the
//! cascade so no money is spent on addresses that cannot possibly deliver.

use async_trait::async_trait;
use hickory_resolver::error::ResolveErrorKind;
use hickory_resolver::TokioAsyncResolver;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use crate::errors::PipelineError;

const FREE_PROVIDERS: &[&str] = &[
    "gmail.com",
    "yahoo.com",
    "hotmail.com",
    "outlook.com",
    "aol.com",
    "icloud.com",
    "mail.com",
    "protonmail.com",
    "zoho.com",
    "yandex.com",
    "gmx.com",
    "live.com",
];

const DISPOSABLE_DOMAINS: &[&str] = &[
    "mailinator.com",
    "guerrillamail.com",
    "10minutemail.com",
    "tempmail.com",
    "temp-mail.org",
    "throwaway.email",
    "yopmail.com",
    "trashmail.com",
    "getnada.com",
    "sharklasers.com",
    "maildrop.cc",
    "dispostable.com",
];

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
            .expect("email regex is valid")
    })
}

/// One pass of the cascade, recorded whether it ran, failed or was skipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationPass {
    pub pass_number: u8,
    pub pass_name: String,
    pub passed: bool,
    #[serde(default)]
    pub skipped: bool,
    /// Confidence contribution of this pass.
    pub score: f64,
    pub cost: f64,
    pub elapsed_ms: u64,
    pub detail: String,
}

/// Full cascade outcome. Failure modes are data here, never errors: a bad
/// address is a normal result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    pub email: String,
    pub status: String,
    pub is_valid: bool,
    /// Sum of pass contributions, 0-100.
    pub confidence: f64,
    pub passes_completed: u8,
    pub syntax_score: f64,
    pub domain_score: f64,
    pub mailbox_score: f64,
    /// Weighted deliverability: syntax 20%, domain 30%, mailbox 50%.
    pub deliverability_score: f64,
    pub is_free_provider: bool,
    pub is_disposable: bool,
    pub is_role_account: bool,
    pub is_catch_all: bool,
    pub total_cost: f64,
    pub total_time_ms: u64,
    pub passes: Vec<VerificationPass>,
}

/// Mailbox classification returned by the paid validation provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MailboxClassification {
    Deliverable,
    Risky,
    Undeliverable,
    Unknown,
}

impl MailboxClassification {
    pub fn as_str(self) -> &'static str {
        match self {
            MailboxClassification::Deliverable => "deliverable",
            MailboxClassification::Risky => "risky",
            MailboxClassification::Undeliverable => "undeliverable",
            MailboxClassification::Unknown => "unknown",
        }
    }

    fn base_score(self) -> f64 {
        match self {
            MailboxClassification::Deliverable => 40.0,
            MailboxClassification::Risky => 20.0,
            MailboxClassification::Undeliverable => 0.0,
            MailboxClassification::Unknown => 10.0,
        }
    }
}

/// Successful mailbox validation verdict.
#[derive(Debug, Clone)]
pub struct MailboxVerdict {
    pub classification: MailboxClassification,
    pub is_role_account: bool,
    /// The domain accepts any local part, so deliverability is unproven.
    pub is_catch_all: bool,
}

/// Failed mailbox validation attempt. `cost` is whatever the provider charged
/// for the attempt; a request that was never submitted costs nothing.
#[derive(Debug, Clone)]
pub struct MailboxFailure {
    pub reason: String,
    pub cost: f64,
}

/// MX lookup seam, implemented over hickory in production and stubbed in tests.
#[async_trait]
pub trait MxResolver: Send + Sync {
    /// Whether the domain has at least one MX record. Resolution failures
    /// count as no mail servers, matching how undeliverable these domains
    /// are in practice.
    async fn has_mx_records(&self, domain: &str) -> bool;
}

/// Mailbox validation seam over the paid provider.
#[async_trait]
pub trait MailboxValidator: Send + Sync {
    async fn validate_mailbox(&self, email: &str) -> Result<MailboxVerdict, MailboxFailure>;
}

/// System-configured DNS resolver.
pub struct HickoryMxResolver {
    resolver: TokioAsyncResolver,
}

impl HickoryMxResolver {
    pub fn from_system_conf() -> Result<Self, PipelineError> {
        let resolver = TokioAsyncResolver::tokio_from_system_conf().map_err(|e| {
            PipelineError::Configuration(format!("failed to initialize DNS resolver: {}", e))
        })?;
        Ok(Self { resolver })
    }
}

#[async_trait]
impl MxResolver for HickoryMxResolver {
    async fn has_mx_records(&self, domain: &str) -> bool {
        match self.resolver.mx_lookup(domain).await {
            Ok(lookup) => lookup.iter().next().is_some(),
            Err(e) => {
                if !matches!(e.kind(), ResolveErrorKind::NoRecordsFound { .. }) {
                    tracing::warn!("MX lookup failed for {}: {}", domain, e);
                }
                false
            }
        }
    }
}

/// The cascade orchestrator. Mailbox validation is optional; without it the
/// cascade terminates after pass 2 with the `dns_valid` status.
pub struct CascadeVerifier {
    mx_resolver: Arc<dyn MxResolver>,
    mailbox_validator: Option<Arc<dyn MailboxValidator>>,
}

impl CascadeVerifier {
    pub fn new(
        mx_resolver: Arc<dyn MxResolver>,
        mailbox_validator: Option<Arc<dyn MailboxValidator>>,
    ) -> Self {
        Self {
            mx_resolver,
            mailbox_validator,
        }
    }

    pub async fn verify(&self, email: &str) -> VerificationResult {
        let started = Instant::now();
        let mut passes = Vec::with_capacity(3);

        let domain = email.split('@').nth(1).unwrap_or("").to_lowercase();
        let is_disposable = DISPOSABLE_DOMAINS.contains(&domain.as_str());

        // Pass 1: syntax and format, free
        let pass_1 = syntax_pass(email);
        let syntax_score = pass_1.score;
        let pass_1_ok = pass_1.passed;
        passes.push(pass_1);

        if !pass_1_ok {
            tracing::info!("Verification failed at pass 1 for {}", email);
            return VerificationResult {
                email: email.to_string(),
                status: "invalid_syntax".to_string(),
                is_valid: false,
                confidence: 0.0,
                passes_completed: 1,
                syntax_score: 0.0,
                domain_score: 0.0,
                mailbox_score: 0.0,
                deliverability_score: 0.0,
                is_free_provider: false,
                is_disposable,
                is_role_account: false,
                is_catch_all: false,
                total_cost: 0.0,
                total_time_ms: started.elapsed().as_millis() as u64,
                passes,
            };
        }

        // Pass 2: DNS/MX, free
        let pass_2_started = Instant::now();
        let has_mx = self.mx_resolver.has_mx_records(&domain).await;
        let is_free = FREE_PROVIDERS.contains(&domain.as_str());

        let domain_score = if !has_mx {
            0.0
        } else if is_free {
            25.0
        } else {
            30.0
        };
        passes.push(VerificationPass {
            pass_number: 2,
            pass_name: "Domain & MX Validation".to_string(),
            passed: has_mx,
            skipped: false,
            score: domain_score,
            cost: 0.0,
            elapsed_ms: pass_2_started.elapsed().as_millis() as u64,
            detail: if has_mx {
                format!(
                    "{} has mail servers ({} provider)",
                    domain,
                    if is_free { "free" } else { "business" }
                )
            } else {
                format!("{} has no mail servers", domain)
            },
        });

        if !has_mx {
            tracing::info!("Verification failed at pass 2 for {}", email);
            return VerificationResult {
                email: email.to_string(),
                status: "invalid_domain".to_string(),
                is_valid: false,
                confidence: syntax_score,
                passes_completed: 2,
                syntax_score,
                domain_score: 0.0,
                mailbox_score: 0.0,
                deliverability_score: 0.0,
                is_free_provider: is_free,
                is_disposable,
                is_role_account: false,
                is_catch_all: false,
                total_cost: 0.0,
                total_time_ms: started.elapsed().as_millis() as u64,
                passes,
            };
        }

        // Pass 3: mailbox validation, paid
        let validator = match &self.mailbox_validator {
            Some(v) => v,
            None => {
                passes.push(VerificationPass {
                    pass_number: 3,
                    pass_name: "Mailbox Validation".to_string(),
                    passed: false,
                    skipped: true,
                    score: 0.0,
                    cost: 0.0,
                    elapsed_ms: 0,
                    detail: "mailbox validation not configured".to_string(),
                });
                let confidence = syntax_score + domain_score;
                return VerificationResult {
                    email: email.to_string(),
                    status: "dns_valid".to_string(),
                    is_valid: false,
                    confidence,
                    passes_completed: 2,
                    syntax_score,
                    domain_score,
                    mailbox_score: 0.0,
                    deliverability_score: syntax_score * 0.2 + domain_score * 0.3,
                    is_free_provider: is_free,
                    is_disposable,
                    is_role_account: false,
                    is_catch_all: false,
                    total_cost: 0.0,
                    total_time_ms: started.elapsed().as_millis() as u64,
                    passes,
                };
            }
        };

        let pass_3_started = Instant::now();
        let (status, is_valid, mailbox_score, is_role, is_catch_all, cost, detail, passed) =
            match validator.validate_mailbox(email).await {
                Ok(verdict) => {
                    let mut score = verdict.classification.base_score();
                    if verdict.is_role_account {
                        score -= 5.0;
                    }
                    let score = score.clamp(0.0, 40.0);
                    let passed = verdict.classification == MailboxClassification::Deliverable;
                    (
                        verdict.classification.as_str().to_string(),
                        passed,
                        score,
                        verdict.is_role_account,
                        verdict.is_catch_all,
                        0.005,
                        format!("classified as {}", verdict.classification.as_str()),
                        passed,
                    )
                }
                Err(failure) => {
                    tracing::warn!("Mailbox validation failed for {}: {}", email, failure.reason);
                    (
                        "unknown".to_string(),
                        false,
                        0.0,
                        false,
                        false,
                        failure.cost,
                        failure.reason,
                        false,
                    )
                }
            };

        passes.push(VerificationPass {
            pass_number: 3,
            pass_name: "Mailbox Validation".to_string(),
            passed,
            skipped: false,
            score: mailbox_score,
            cost,
            elapsed_ms: pass_3_started.elapsed().as_millis() as u64,
            detail,
        });

        VerificationResult {
            email: email.to_string(),
            status,
            is_valid,
            confidence: syntax_score + domain_score + mailbox_score,
            passes_completed: 3,
            syntax_score,
            domain_score,
            mailbox_score,
            deliverability_score: syntax_score * 0.2 + domain_score * 0.3 + mailbox_score * 0.5,
            is_free_provider: is_free,
            is_disposable,
            is_role_account: is_role,
            is_catch_all,
            total_cost: cost,
            total_time_ms: started.elapsed().as_millis() as u64,
            passes,
        }
    }
}

/// Pass 1: regex plus structural checks plus the disposable-domain list.
/// Free and synchronous, usable standalone for cheap input screening.
pub fn syntax_pass(email: &str) -> VerificationPass {
    let started = Instant::now();
    let mut failures: Vec<&str> = Vec::new();

    if !email_regex().is_match(email) {
        failures.push("regex pattern");
    }

    let parts: Vec<&str> = email.split('@').collect();
    let well_formed = parts.len() == 2 && !parts[0].is_empty() && !parts[1].is_empty();
    if !well_formed {
        failures.push("local@domain structure");
    }
    if well_formed && !parts[1].contains('.') {
        failures.push("domain dot");
    }
    if email.len() > 320 {
        failures.push("length");
    }
    if email.contains("..") {
        failures.push("consecutive dots");
    }
    if well_formed && DISPOSABLE_DOMAINS.contains(&parts[1].to_lowercase().as_str()) {
        failures.push("disposable domain");
    }

    let passed = failures.is_empty();
    VerificationPass {
        pass_number: 1,
        pass_name: "Syntax & Format Validation".to_string(),
        passed,
        skipped: false,
        score: if passed { 30.0 } else { 0.0 },
        cost: 0.0,
        elapsed_ms: started.elapsed().as_millis() as u64,
        detail: if passed {
            "all format checks passed".to_string()
        } else {
            format!("failed checks: {}", failures.join(", "))
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_address_passes_syntax() {
        let pass = syntax_pass("jane.doe+tag@acme-corp.io");
        assert!(pass.passed);
        assert_eq!(pass.score, 30.0);
    }

    #[test]
    fn malformed_addresses_fail_syntax() {
        for email in [
            "not-an-email",
            "@acme.io",
            "jane@",
            "jane@acme",
            "jane@@acme.io",
            "jane..doe@acme.io",
        ] {
            let pass = syntax_pass(email);
            assert!(!pass.passed, "expected failure for {}", email);
            assert_eq!(pass.score, 0.0);
        }
    }

    #[test]
    fn overlong_address_fails_syntax() {
        let email = format!("{}@acme.io", "a".repeat(320));
        assert!(!syntax_pass(&email).passed);
    }

    #[test]
    fn disposable_domain_fails_syntax() {
        let pass = syntax_pass("someone@mailinator.com");
        assert!(!pass.passed);
        assert!(pass.detail.contains("disposable"));
    }

    #[test]
    fn free_provider_list_is_exact_domains() {
        assert!(FREE_PROVIDERS.contains(&"gmail.com"));
        assert!(!FREE_PROVIDERS.contains(&"gmail.co.uk"));
    }
}
