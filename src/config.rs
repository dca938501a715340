use serde::Deserialize;

/// Runtime configuration loaded from the environment.
///
/// Mailbox validation credentials are optional: when absent, the verification
/// cascade completes after two passes with the `dns_valid` terminal status.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub mailbox_api_url: String,
    pub mailbox_api_username: Option<String>,
    pub mailbox_api_password: Option<String>,
    pub tech_detect_api_url: String,
    pub company_search_api_url: String,
    pub company_search_api_key: Option<String>,
    pub knowledge_graph_api_url: String,
    pub knowledge_graph_api_key: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable required"))
                .and_then(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("DATABASE_URL cannot be empty");
                    }
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DATABASE_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            mailbox_api_url: std::env::var("MAILBOX_API_URL")
                .unwrap_or_else(|_| "https://api.verifalia.com/v2.4".to_string()),
            mailbox_api_username: std::env::var("MAILBOX_API_USERNAME")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            mailbox_api_password: std::env::var("MAILBOX_API_PASSWORD")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            tech_detect_api_url: std::env::var("TECH_DETECT_API_URL")
                .unwrap_or_else(|_| "https://api.wappalyzer.com/v2".to_string()),
            company_search_api_url: std::env::var("COMPANY_SEARCH_API_URL")
                .unwrap_or_else(|_| "https://serpapi.com".to_string()),
            company_search_api_key: std::env::var("COMPANY_SEARCH_API_KEY")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            knowledge_graph_api_url: std::env::var("KNOWLEDGE_GRAPH_API_URL")
                .unwrap_or_else(|_| "https://kgsearch.googleapis.com/v1".to_string()),
            knowledge_graph_api_key: std::env::var("KNOWLEDGE_GRAPH_API_KEY")
                .ok()
                .filter(|s| !s.trim().is_empty()),
        };

        tracing::info!("Configuration loaded successfully");
        tracing::debug!(
            "Database URL: {}...",
            &config.database_url[..20.min(config.database_url.len())]
        );
        if config.mailbox_credentials().is_some() {
            tracing::info!("Mailbox validation credentials configured");
        } else {
            tracing::warn!("Mailbox validation not configured - verification stops after pass 2");
        }
        tracing::debug!("Server port: {}", config.port);

        Ok(config)
    }

    /// Returns the mailbox validation credentials when both are configured.
    pub fn mailbox_credentials(&self) -> Option<(&str, &str)> {
        match (&self.mailbox_api_username, &self.mailbox_api_password) {
            (Some(user), Some(pass)) => Some((user.as_str(), pass.as_str())),
            _ => None,
        }
    }
}
