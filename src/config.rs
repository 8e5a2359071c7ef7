use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Shared secret required by the registration endpoint.
    pub api_key: String,
    /// Public base URL used to build approval, dashboard and sandbox URLs.
    /// Set via PUBLIC_BASE_URL. Default: `http://localhost:<port>`.
    pub public_base_url: Option<String>,
    /// Upper bound on a single callback delivery.
    /// Set via RELAY_DELIVERY_TIMEOUT_SECS. Default: 30.
    pub delivery_timeout: Duration,
    /// Allowed CORS origin for the dashboard, besides localhost.
    pub dashboard_origin: String,
    /// Public tunnel domain, only used for the startup hint.
    pub domain: Option<String>,
}

impl Config {
    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> String {
        match &self.public_base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://localhost:{}", self.port),
        }
    }

    /// API key with everything but the edges masked, for logs.
    pub fn masked_api_key(&self) -> String {
        mask_key(&self.api_key)
    }
}

pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() > 12 {
        let head: String = chars[..8].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    } else {
        "****".to_string()
    }
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();
    from_lookup(|key| std::env::var(key).ok())
}

/// Build the config from an arbitrary variable source.
pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Config> {
    let api_key = get("API_KEY").map(|k| k.trim().to_string()).unwrap_or_default();
    if api_key.is_empty() {
        anyhow::bail!(
            "API_KEY is not set. Create a .env file with API_KEY=your-secure-key \
             or export it before starting the relay."
        );
    }

    let port = get("PORT").and_then(|v| v.parse().ok()).unwrap_or(3000);

    Ok(Config {
        port,
        api_key,
        public_base_url: get("PUBLIC_BASE_URL").filter(|s| !s.trim().is_empty()),
        delivery_timeout: Duration::from_secs(
            get("RELAY_DELIVERY_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .filter(|secs| *secs > 0)
                .unwrap_or(30),
        ),
        dashboard_origin: get("DASHBOARD_ORIGIN")
            .unwrap_or_else(|| "http://localhost:3000".to_string()),
        domain: get("DOMAIN").filter(|s| !s.is_empty()),
    })
}
