use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub state_path: Option<PathBuf>,
    pub public_base_url: Option<String>,
    pub generator_command: Option<String>,
    pub generator_timeout: Duration,
    pub max_upload_bytes: usize,
    pub create_limit_per_minute: u32,
    pub chat_limit_per_minute: u32,
    pub cors_origins: Vec<String>,
    /// Key rate limits on `x-forwarded-for`. Only safe behind a proxy that
    /// overwrites the header; otherwise the peer address is used.
    pub trust_forwarded_for: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            state_path: Some(PathBuf::from("data/quize_state.json")),
            public_base_url: None,
            generator_command: None,
            generator_timeout: Duration::from_secs(60),
            max_upload_bytes: 10 * 1024 * 1024,
            create_limit_per_minute: 30,
            chat_limit_per_minute: 60,
            cors_origins: Vec::new(),
            trust_forwarded_for: false,
        }
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parsed<T: std::str::FromStr>(key: &str, fallback: T) -> T {
    env_nonempty(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(fallback)
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Config::default();
        let state_path = match std::env::var("LOCAL_STATE_PATH") {
            Ok(v) if v.trim().is_empty() => None,
            Ok(v) => Some(PathBuf::from(v)),
            Err(_) => defaults.state_path,
        };
        let cors_origins = env_nonempty("CORS_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            host: env_nonempty("HOST").unwrap_or(defaults.host),
            port: env_parsed("PORT", defaults.port),
            state_path,
            public_base_url: env_nonempty("PUBLIC_BASE_URL")
                .map(|v| v.trim_end_matches('/').to_string()),
            generator_command: env_nonempty("GENERATOR_COMMAND"),
            generator_timeout: Duration::from_secs(env_parsed(
                "GENERATOR_TIMEOUT_SECS",
                defaults.generator_timeout.as_secs(),
            )),
            max_upload_bytes: env_parsed("MAX_UPLOAD_BYTES", defaults.max_upload_bytes),
            create_limit_per_minute: env_parsed(
                "CREATE_LIMIT_PER_MINUTE",
                defaults.create_limit_per_minute,
            ),
            chat_limit_per_minute: env_parsed("CHAT_LIMIT_PER_MINUTE", defaults.chat_limit_per_minute),
            cors_origins,
            trust_forwarded_for: env_parsed("TRUST_FORWARDED_FOR", defaults.trust_forwarded_for),
        }
    }

    /// Config for tests and embedding: nothing touches disk.
    pub fn ephemeral() -> Self {
        Self {
            state_path: None,
            ..Config::default()
        }
    }

    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}
