use std::time::Duration;

use crate::document::assembler::DEFAULT_SPONSOR;

pub const PRODUCTION_HOST: &str = "beone-d.beigenecorp.net";
pub const PRODUCTION_API: &str = "https://beone-d.beigenecorp.net/api/aimta";
pub const CORPORATE_DOMAIN: &str = "beigenecorp.net";
pub const DEV_IP: &str = "10.8.63.207";

/// Identity-provider settings for the silent token grant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdentityConfig {
    pub client_id: String,
    pub authority: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
}

impl IdentityConfig {
    pub fn token_endpoint(&self) -> String {
        format!("{}/oauth2/v2.0/token", self.authority.trim_end_matches('/'))
    }
}

/// Deployment configuration, resolved once at startup and injected.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub api_base_url: String,
    pub identity: IdentityConfig,
    pub request_timeout: Duration,
    /// Tokens expiring within this window are refreshed before use.
    pub token_refresh_threshold: Duration,
    pub monitor_interval: Duration,
    pub poll_interval: Duration,
    pub max_polls: u32,
    /// Name shown on the right of the running header.
    pub sponsor: String,
}

fn is_dev_host(hostname: &str) -> bool {
    matches!(hostname, "localhost" | "127.0.0.1" | DEV_IP)
}

fn api_base_for(hostname: &str) -> &'static str {
    if hostname == PRODUCTION_HOST || hostname.contains(CORPORATE_DOMAIN) {
        return PRODUCTION_API;
    }
    match hostname {
        "localhost" | "127.0.0.1" => "https://localhost:8000",
        DEV_IP => "https://10.8.63.207:8000",
        _ => PRODUCTION_API,
    }
}

impl AppConfig {
    /// Deployment table keyed by the hosting page's hostname. Unknown hosts
    /// fall back to production.
    pub fn for_hostname(hostname: &str) -> Self {
        let hostname = hostname.trim().to_ascii_lowercase();
        let redirect_uri = if is_dev_host(&hostname) {
            "https://localhost:3000/user/login"
        } else {
            "https://beone-d.beigenecorp.net/user/login"
        };
        Self {
            api_base_url: api_base_for(&hostname).to_string(),
            identity: IdentityConfig {
                client_id: "244a9262-04ff-4f5b-8958-2eeb0cedb928".to_string(),
                authority: "https://login.microsoftonline.com/7dbc552d-50d7-4396-aeb9-04d0d393261b"
                    .to_string(),
                redirect_uri: redirect_uri.to_string(),
                scopes: vec!["User.Read".to_string()],
            },
            request_timeout: Duration::from_secs(30),
            token_refresh_threshold: Duration::from_secs(5 * 60),
            monitor_interval: Duration::from_secs(5 * 60),
            poll_interval: Duration::from_secs(5),
            max_polls: 60,
            sponsor: DEFAULT_SPONSOR.to_string(),
        }
    }

    /// Resolve from `AIMTA_HOST` (production when unset), then apply
    /// environment overrides.
    pub fn from_env() -> Self {
        let host = std::env::var("AIMTA_HOST").unwrap_or_else(|_| PRODUCTION_HOST.to_string());
        Self::for_hostname(&host).apply_env()
    }

    pub fn apply_env(mut self) -> Self {
        if let Ok(v) = std::env::var("AIMTA_API_BASE") {
            self.api_base_url = v;
        }
        if let Ok(v) = std::env::var("AIMTA_CLIENT_ID") {
            self.identity.client_id = v;
        }
        if let Ok(v) = std::env::var("AIMTA_AUTHORITY") {
            self.identity.authority = v;
        }
        if let Ok(v) = std::env::var("AIMTA_REDIRECT_URI") {
            self.identity.redirect_uri = v;
        }
        if let Ok(v) = std::env::var("AIMTA_SCOPES") {
            self.identity.scopes = v.split_whitespace().map(str::to_string).collect();
        }
        self.request_timeout = std::env::var("AIMTA_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(self.request_timeout);
        self.poll_interval = std::env::var("AIMTA_POLL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(self.poll_interval);
        self.max_polls = std::env::var("AIMTA_MAX_POLLS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(self.max_polls);
        if let Ok(v) = std::env::var("AIMTA_SPONSOR") {
            self.sponsor = v;
        }
        self
    }
}
