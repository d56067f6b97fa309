use std::collections::HashMap;
use std::time::Duration;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:3005";
pub const DEFAULT_STORE_DSN: &str = "memory://";

const DEFAULT_MODELS_WHITE_LIST: &str = "text-embedding-3-large,text-embedding-3-small,\
text-embedding-ada-002,whisper-1,tts-1,gpt-4o-mini,gpt-4o,o3-mini,gpt-4.1,gpt-4.1-mini,\
o4-mini,sora,gpt-5-chat-latest,gpt-5-mini";

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub http: HttpConfig,
    pub openai: OpenAiConfig,
    pub azure: AzureConfig,
    pub oidc: OidcConfig,
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub listen_addr: String,
    /// Access gate switch. OFF unless `HTTP_ENABLE_AUTH=true`: an operator
    /// must opt in, otherwise the proxy routes are open to anyone.
    pub enable_auth: bool,
    pub store_dsn: String,
    /// Deadline for the upstream to return response headers.
    pub upstream_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.into(),
            enable_auth: false,
            store_dsn: DEFAULT_STORE_DSN.into(),
            upstream_timeout: Duration::from_secs(60),
        }
    }
}

/// Direct-passthrough backend settings.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub target_base_url: String,
    pub api_key: String,
    pub org_id: Option<String>,
    pub project_id: Option<String>,
    pub models_white_list: Vec<String>,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            target_base_url: DEFAULT_OPENAI_BASE_URL.into(),
            api_key: String::new(),
            org_id: None,
            project_id: None,
            models_white_list: split_list(DEFAULT_MODELS_WHITE_LIST),
        }
    }
}

/// Deployment-addressed backend settings. Validation and defaults are applied
/// by `AzureProxy::new`.
#[derive(Debug, Clone, Default)]
pub struct AzureConfig {
    pub endpoint: String,
    pub api_key: String,
    pub api_version: String,
    pub default_model: String,
    pub model_mappings: HashMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct OidcConfig {
    pub issuer_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
    pub scopes: Vec<String>,
    pub allowed_domains: Vec<String>,
}

impl OidcConfig {
    pub fn is_configured(&self) -> bool {
        !self.issuer_url.is_empty() && !self.client_id.is_empty()
    }
}

/// Load configuration from `.env` (if present) and the process environment.
pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();
    from_lookup(|key| std::env::var(key).ok())
}

/// Build a `Config` from any key lookup.
pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    let upstream_timeout = match non_empty("UPSTREAM_TIMEOUT_SECS") {
        Some(raw) => {
            let secs: u64 = raw
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("UPSTREAM_TIMEOUT_SECS must be an integer, got '{}'", raw))?;
            Duration::from_secs(secs)
        }
        None => HttpConfig::default().upstream_timeout,
    };

    let http = HttpConfig {
        listen_addr: non_empty("HTTP_LISTEN_ADDR")
            .map(|a| normalize_listen_addr(&a))
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.into()),
        enable_auth: lookup("HTTP_ENABLE_AUTH").as_deref() == Some("true"),
        store_dsn: non_empty("HTTP_DB_DSN").unwrap_or_else(|| DEFAULT_STORE_DSN.into()),
        upstream_timeout,
    };

    // An explicitly empty white list is honoured; only an unset one gets the default.
    let openai = OpenAiConfig {
        target_base_url: lookup("OPENAI_TARGET_BASE_URL").unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.into()),
        api_key: lookup("OPENAI_API_KEY").unwrap_or_default(),
        org_id: non_empty("OPENAI_ORG_ID"),
        project_id: non_empty("OPENAI_PROJECT_ID"),
        models_white_list: split_list(
            &lookup("OPENAI_MODELS_WHITE_LIST").unwrap_or_else(|| DEFAULT_MODELS_WHITE_LIST.into()),
        ),
    };

    let model_mappings = match non_empty("AZURE_OPENAI_MODEL_MAPPINGS") {
        Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
            tracing::error!("Failed to parse AZURE_OPENAI_MODEL_MAPPINGS: {}", e);
            HashMap::new()
        }),
        None => HashMap::new(),
    };

    let azure = AzureConfig {
        endpoint: lookup("AZURE_OPENAI_ENDPOINT").unwrap_or_default(),
        api_key: lookup("AZURE_OPENAI_API_KEY").unwrap_or_default(),
        api_version: lookup("AZURE_OPENAI_API_VERSION").unwrap_or_default(),
        default_model: lookup("AZURE_OPENAI_DEFAULT_MODEL").unwrap_or_default(),
        model_mappings,
    };

    let scopes = match non_empty("OIDC_SCOPES") {
        Some(raw) => split_list(&raw),
        None => vec!["openid".into(), "profile".into(), "email".into()],
    };

    let oidc = OidcConfig {
        issuer_url: lookup("OIDC_ISSUER_URL").unwrap_or_default(),
        client_id: lookup("OIDC_CLIENT_ID").unwrap_or_default(),
        client_secret: lookup("OIDC_CLIENT_SECRET").unwrap_or_default(),
        redirect_url: lookup("OIDC_REDIRECT_URL").unwrap_or_default(),
        scopes,
        allowed_domains: split_list(&lookup("OIDC_ALLOWED_DOMAINS").unwrap_or_default()),
    };

    Ok(Config { http, openai, azure, oidc })
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// `:3005` means every interface, as with Go-style listen addresses.
fn normalize_listen_addr(addr: &str) -> String {
    let addr = addr.trim();
    if addr.starts_with(':') {
        format!("0.0.0.0{}", addr)
    } else {
        addr.to_string()
    }
}
