/// Configuration management for the API server
///
/// Configuration comes from environment variables, with a `.env` file loaded
/// first when present.
///
/// # Environment Variables
///
/// - `DATABASE_URL`: PostgreSQL connection string (required)
/// - `DATABASE_MAX_CONNECTIONS`: Pool size (default: 10)
/// - `JWT_SECRET`: HS256 signing secret, at least 32 characters (required)
/// - `JWT_ACCESS_TTL_MINUTES`: Access token lifetime (default: 60)
/// - `JWT_REFRESH_TTL_DAYS`: Refresh token lifetime (default: 30)
/// - `API_HOST` / `API_PORT`: Bind address (default: 0.0.0.0:8080)
/// - `CORS_ORIGINS`: Comma-separated allowed origins, `*` for any (default: *)
/// - `PRODUCTION`: Enables HSTS (default: false)
/// - `RATE_LIMIT_PER_MINUTE`: Requests per user per minute (default: 120)
/// - `AUTH_RATE_LIMIT_PER_MINUTE`: Auth requests per IP per minute (default: 10)
/// - `LOG_FORMAT`: `pretty` or `json` (default: pretty)
///
/// # Example
///
/// ```no_run
/// use planboard_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use anyhow::Context;
use planboard_shared::auth::jwt::TokenTtl;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub rate_limit: RateLimitConfig,
    pub log_format: LogFormat,
}

/// API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,

    /// Allowed CORS origins; `*` allows any origin
    pub cors_origins: Vec<String>,

    /// Production mode adds HSTS
    pub production: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// JWT configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    /// Secret key for JWT signing
    ///
    /// Must be kept secret and at least 32 bytes.
    /// Generate with: `openssl rand -hex 32`
    pub secret: String,

    pub access_ttl_minutes: i64,
    pub refresh_ttl_days: i64,
}

impl JwtConfig {
    pub fn token_ttl(&self) -> TokenTtl {
        TokenTtl {
            access: chrono::Duration::minutes(self.access_ttl_minutes),
            refresh: chrono::Duration::days(self.refresh_ttl_days),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests per minute per authenticated user
    pub per_minute: u32,

    /// Requests per minute per client IP on `/v1/auth/*`
    pub auth_per_minute: u32,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => anyhow::bail!("LOG_FORMAT must be 'pretty' or 'json', got '{}'", other),
        }
    }
}

/// Reads `key` through `lookup` and parses it, falling back to `default`
fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{} has an invalid value '{}': {}", key, raw, e)),
        None => Ok(default),
    }
}

impl Config {
    /// Loads configuration from the process environment
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or any variable
    /// has an invalid value.
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present (for development)
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds configuration from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let host = lookup("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = parse_or(&lookup, "API_PORT", 8080u16)?;

        let cors_origins: Vec<String> = lookup("CORS_ORIGINS")
            .unwrap_or_else(|| "*".to_string())
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_string)
            .collect();

        let production = parse_or(&lookup, "PRODUCTION", false)?;

        let database_url = lookup("DATABASE_URL").context("DATABASE_URL environment variable is required")?;
        let max_connections = parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10u32)?;

        let secret = lookup("JWT_SECRET").context("JWT_SECRET environment variable is required")?;
        if secret.len() < 32 {
            anyhow::bail!("JWT_SECRET must be at least 32 characters long");
        }

        let access_ttl_minutes = parse_or(&lookup, "JWT_ACCESS_TTL_MINUTES", 60i64)?;
        let refresh_ttl_days = parse_or(&lookup, "JWT_REFRESH_TTL_DAYS", 30i64)?;
        if access_ttl_minutes <= 0 || refresh_ttl_days <= 0 {
            anyhow::bail!("JWT token lifetimes must be positive");
        }

        let per_minute = parse_or(&lookup, "RATE_LIMIT_PER_MINUTE", 120u32)?;
        let auth_per_minute = parse_or(&lookup, "AUTH_RATE_LIMIT_PER_MINUTE", 10u32)?;
        if per_minute == 0 || auth_per_minute == 0 {
            anyhow::bail!("Rate limits must be at least 1 request per minute");
        }

        let log_format = parse_or(&lookup, "LOG_FORMAT", LogFormat::Pretty)?;

        Ok(Self {
            api: ApiConfig {
                host,
                port,
                cors_origins,
                production,
            },
            database: DatabaseConfig {
                url: database_url,
                max_connections,
            },
            jwt: JwtConfig {
                secret,
                access_ttl_minutes,
                refresh_ttl_days,
            },
            rate_limit: RateLimitConfig {
                per_minute,
                auth_per_minute,
            },
            log_format,
        })
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }

    /// Whether any origin is allowed
    pub fn cors_allows_any(&self) -> bool {
        self.api.cors_origins.iter().any(|origin| origin == "*")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SECRET: &str = "test-secret-key-at-least-32-bytes-long";

    fn load(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(move |key| map.get(key).cloned())
    }

    fn required() -> Vec<(&'static str, &'static str)> {
        vec![("DATABASE_URL", "postgresql://localhost/test"), ("JWT_SECRET", SECRET)]
    }

    #[test]
    fn test_defaults() {
        let config = load(&required()).unwrap();

        assert_eq!(config.bind_address(), "0.0.0.0:8080");
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.jwt.access_ttl_minutes, 60);
        assert_eq!(config.jwt.refresh_ttl_days, 30);
        assert_eq!(config.rate_limit.per_minute, 120);
        assert_eq!(config.rate_limit.auth_per_minute, 10);
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(config.cors_allows_any());
        assert!(!config.api.production);
    }

    #[test]
    fn test_overrides() {
        let mut vars = required();
        vars.extend([
            ("API_HOST", "127.0.0.1"),
            ("API_PORT", "9000"),
            ("CORS_ORIGINS", "https://a.example, https://b.example,"),
            ("PRODUCTION", "true"),
            ("JWT_ACCESS_TTL_MINUTES", "15"),
            ("LOG_FORMAT", "JSON"),
        ]);
        let config = load(&vars).unwrap();

        assert_eq!(config.bind_address(), "127.0.0.1:9000");
        assert_eq!(
            config.api.cors_origins,
            ["https://a.example", "https://b.example"]
        );
        assert!(!config.cors_allows_any());
        assert!(config.api.production);
        assert_eq!(config.jwt.token_ttl().access, chrono::Duration::minutes(15));
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_missing_required() {
        let err = load(&[("JWT_SECRET", SECRET)]).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));

        let err = load(&[("DATABASE_URL", "postgresql://localhost/test")]).unwrap_err();
        assert!(err.to_string().contains("JWT_SECRET"));
    }

    #[test]
    fn test_short_secret_rejected() {
        let err = load(&[("DATABASE_URL", "postgresql://localhost/test"), ("JWT_SECRET", "short")])
            .unwrap_err();
        assert!(err.to_string().contains("at least 32"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut vars = required();
        vars.push(("API_PORT", "eighty"));
        assert!(load(&vars).unwrap_err().to_string().contains("API_PORT"));

        let mut vars = required();
        vars.push(("RATE_LIMIT_PER_MINUTE", "0"));
        assert!(load(&vars).is_err());

        let mut vars = required();
        vars.push(("LOG_FORMAT", "xml"));
        assert!(load(&vars).is_err());
    }
}
