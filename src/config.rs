use std::env;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub redis: RedisConfig,
    pub upstream: UpstreamConfig,
    pub cns: CnsConfig,
    pub cache: CacheConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Origin allowed by CORS (the timetable web UI).
    pub frontend_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Connection URL, e.g. `redis://localhost:6379`.
    /// When unset the service falls back to an in-process memory cache.
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of the Scientia public API.
    pub base_url: String,
    /// Institution identity all catalog and event queries are scoped to.
    pub institution_identity: String,
    pub timeout_seconds: u64,
    /// Total attempts per request before the error is surfaced.
    pub max_attempts: u32,
    /// Fixed delay between attempts.
    pub retry_backoff_seconds: u64,
}

/// The clubs and societies API. Shares the retry policy of `UpstreamConfig`.
#[derive(Debug, Clone, Deserialize)]
pub struct CnsConfig {
    /// Clubs and societies are unavailable when unset.
    pub host: Option<String>,
    pub port: u16,
}

impl CnsConfig {
    pub fn base_url(&self) -> Option<String> {
        self.host
            .as_ref()
            .map(|host| format!("http://{}:{}", host, self.port))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// TTL for whole category listings.
    pub category_ttl_seconds: u64,
    /// TTL for per-item timetables.
    pub timetable_ttl_seconds: u64,
    /// Load the course, module and location listings into the cache at startup.
    pub prime_on_startup: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Allowed requests per second (per IP) for /api endpoints
    pub api_per_second: u32,
    /// Burst size for /api endpoints
    pub api_burst: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let defaults = Config::default();

        Ok(Config {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or(defaults.server.host),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8080".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("PORT".to_string()))?,
                frontend_url: env::var("FRONTEND_URL").unwrap_or(defaults.server.frontend_url),
            },
            redis: RedisConfig {
                url: env::var("REDIS_URL").ok().filter(|v| !v.trim().is_empty()),
            },
            upstream: UpstreamConfig {
                base_url: env::var("SCIENTIA_BASE_URL").unwrap_or(defaults.upstream.base_url),
                institution_identity: env::var("SCIENTIA_INSTITUTION_IDENTITY")
                    .unwrap_or(defaults.upstream.institution_identity),
                timeout_seconds: env::var("UPSTREAM_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .unwrap_or(30),
                max_attempts: match env::var("UPSTREAM_MAX_ATTEMPTS") {
                    Ok(v) => match v.parse::<u32>() {
                        Ok(0) | Err(_) => {
                            return Err(ConfigError::InvalidValue(
                                "UPSTREAM_MAX_ATTEMPTS".to_string(),
                            ))
                        }
                        Ok(n) => n,
                    },
                    Err(_) => defaults.upstream.max_attempts,
                },
                retry_backoff_seconds: env::var("UPSTREAM_RETRY_BACKOFF_SECONDS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
            },
            cns: CnsConfig {
                host: env::var("CNS_HOST").ok().filter(|v| !v.trim().is_empty()),
                port: env::var("CNS_PORT")
                    .unwrap_or_else(|_| defaults.cns.port.to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("CNS_PORT".to_string()))?,
            },
            cache: CacheConfig {
                category_ttl_seconds: env::var("CACHE_CATEGORY_TTL_SECONDS")
                    .unwrap_or_else(|_| "86400".to_string())
                    .parse()
                    .unwrap_or(86400),
                timetable_ttl_seconds: env::var("CACHE_TIMETABLE_TTL_SECONDS")
                    .unwrap_or_else(|_| "43200".to_string())
                    .parse()
                    .unwrap_or(43200),
                prime_on_startup: match env::var("CACHE_PRIME_ON_STARTUP") {
                    Ok(v) => match v.to_lowercase().as_str() {
                        "1" | "true" | "yes" => true,
                        "0" | "false" | "no" => false,
                        _ => true,
                    },
                    Err(_) => true,
                },
            },
            rate_limit: RateLimitConfig {
                api_per_second: env::var("RATE_LIMIT_API_PER_SECOND")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
                api_burst: env::var("RATE_LIMIT_API_BURST")
                    .unwrap_or_else(|_| "20".to_string())
                    .parse()
                    .unwrap_or(20),
            },
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                frontend_url: "http://localhost:3000".to_string(),
            },
            redis: RedisConfig { url: None },
            upstream: UpstreamConfig {
                base_url: "https://scientia-eu-v4-api-d1-03.azurewebsites.net/api/Public"
                    .to_string(),
                institution_identity: "a1fdee6b-68eb-47b8-b2ac-a4c60c8e6177".to_string(),
                timeout_seconds: 30,
                max_attempts: 3,
                retry_backoff_seconds: 5,
            },
            cns: CnsConfig {
                host: None,
                port: 80,
            },
            cache: CacheConfig {
                category_ttl_seconds: 86400,
                timetable_ttl_seconds: 43200,
                prime_on_startup: true,
            },
            rate_limit: RateLimitConfig {
                api_per_second: 5,
                api_burst: 20,
            },
        }
    }
}
