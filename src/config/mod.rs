use serde::Deserialize;
use std::env;

use crate::error::AppError;
use crate::sso::OriginAllowList;

#[derive(Debug, Clone)]
pub struct PortalConfig {
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub port: u16,
    /// Externally visible base URL of this portal, used for provider
    /// callback and recovery redirect targets.
    pub public_base_url: String,
    pub provider: ProviderConfig,
    pub redis: RedisConfig,
    pub security: SecurityConfig,
    pub sso: SsoConfig,
    pub swagger: SwaggerConfig,
    pub rate_limit: RateLimitConfig,
    pub apps: Vec<RegisteredApp>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub url: String,
    pub api_key: String,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    /// Origins eligible as SSO hand-off targets. Exact-match only.
    pub allowed_redirect_origins: Vec<String>,
    /// CORS origins for the portal's own API surface.
    pub cors_allowed_origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SsoConfig {
    /// How long a deferred redirect survives waiting for the confirmation
    /// email to be opened.
    pub deferred_ttl_seconds: i64,
    /// How long consumed recovery-credential digests are remembered. Must
    /// outlive the provider's recovery link validity.
    pub recovery_dedupe_ttl_seconds: i64,
}

#[derive(Debug, Clone)]
pub struct SwaggerConfig {
    pub enabled: SwaggerMode,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum SwaggerMode {
    Public,
    Disabled,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub login_attempts: u32,
    pub login_window_seconds: u64,
    pub register_attempts: u32,
    pub register_window_seconds: u64,
    pub password_reset_attempts: u32,
    pub password_reset_window_seconds: u64,
    pub global_ip_limit: u32,
    pub global_ip_window_seconds: u64,
}

/// A client application that may be launched from the portal. The callback
/// path is per-application configuration, not part of the hand-off protocol.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisteredApp {
    pub slug: String,
    pub name: String,
    pub url: String,
    #[serde(default = "default_callback_path")]
    pub callback_path: String,
}

fn default_callback_path() -> String {
    "/sso-callback".to_string()
}

impl RegisteredApp {
    pub fn callback_url(&self) -> String {
        format!("{}{}", self.url.trim_end_matches('/'), self.callback_path)
    }
}

impl PortalConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let apps_json = get_env("PORTAL_APPS", Some("[]"), is_prod)?;
        let apps: Vec<RegisteredApp> = serde_json::from_str(&apps_json).map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!("PORTAL_APPS is not valid JSON: {}", e))
        })?;

        let config = PortalConfig {
            environment,
            service_name: get_env("SERVICE_NAME", Some("sso-portal"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            port: get_env("PORT", Some("8080"), is_prod)?
                .parse()
                .map_err(|e: std::num::ParseIntError| {
                    AppError::ConfigError(anyhow::anyhow!(e.to_string()))
                })?,
            public_base_url: get_env(
                "PUBLIC_BASE_URL",
                Some("http://localhost:8080"),
                is_prod,
            )?,
            provider: ProviderConfig {
                url: get_env("PROVIDER_URL", None, is_prod)?,
                api_key: get_env("PROVIDER_API_KEY", None, is_prod)?,
            },
            redis: RedisConfig {
                url: get_env("REDIS_URL", Some("redis://127.0.0.1:6379"), is_prod)?,
            },
            security: SecurityConfig {
                allowed_redirect_origins: split_list(&get_env(
                    "ALLOWED_REDIRECT_ORIGINS",
                    Some("http://localhost:3000,http://localhost:5173"),
                    is_prod,
                )?),
                cors_allowed_origins: split_list(&get_env(
                    "CORS_ALLOWED_ORIGINS",
                    Some("http://localhost:5173"),
                    is_prod,
                )?),
            },
            sso: SsoConfig {
                deferred_ttl_seconds: get_env("SSO_DEFERRED_TTL_SECONDS", Some("86400"), is_prod)?
                    .parse()
                    .unwrap_or(86400),
                recovery_dedupe_ttl_seconds: get_env(
                    "SSO_RECOVERY_DEDUPE_TTL_SECONDS",
                    Some("3600"),
                    is_prod,
                )?
                .parse()
                .unwrap_or(3600),
            },
            swagger: SwaggerConfig {
                enabled: get_env("ENABLE_SWAGGER", Some("public"), is_prod)?
                    .parse()
                    .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?,
            },
            rate_limit: RateLimitConfig {
                login_attempts: get_env("RATE_LIMIT_LOGIN_ATTEMPTS", Some("5"), is_prod)?
                    .parse()
                    .unwrap_or(5),
                login_window_seconds: get_env(
                    "RATE_LIMIT_LOGIN_WINDOW_SECONDS",
                    Some("900"),
                    is_prod,
                )?
                .parse()
                .unwrap_or(900),
                register_attempts: get_env("RATE_LIMIT_REGISTER_ATTEMPTS", Some("3"), is_prod)?
                    .parse()
                    .unwrap_or(3),
                register_window_seconds: get_env(
                    "RATE_LIMIT_REGISTER_WINDOW_SECONDS",
                    Some("3600"),
                    is_prod,
                )?
                .parse()
                .unwrap_or(3600),
                password_reset_attempts: get_env(
                    "RATE_LIMIT_PASSWORD_RESET_ATTEMPTS",
                    Some("3"),
                    is_prod,
                )?
                .parse()
                .unwrap_or(3),
                password_reset_window_seconds: get_env(
                    "RATE_LIMIT_PASSWORD_RESET_WINDOW_SECONDS",
                    Some("3600"),
                    is_prod,
                )?
                .parse()
                .unwrap_or(3600),
                global_ip_limit: get_env("RATE_LIMIT_GLOBAL_IP_LIMIT", Some("100"), is_prod)?
                    .parse()
                    .unwrap_or(100),
                global_ip_window_seconds: get_env(
                    "RATE_LIMIT_GLOBAL_IP_WINDOW_SECONDS",
                    Some("60"),
                    is_prod,
                )?
                .parse()
                .unwrap_or(60),
            },
            apps,
        };

        config.validate()?;
        Ok(config)
    }

    /// Build the redirect allow-list. Fails fast on an entry that does not
    /// parse as an absolute origin.
    pub fn redirect_allowlist(&self) -> Result<OriginAllowList, AppError> {
        OriginAllowList::new(&self.security.allowed_redirect_origins).map_err(|entry| {
            AppError::ConfigError(anyhow::anyhow!(
                "ALLOWED_REDIRECT_ORIGINS entry is not a valid absolute origin: {}",
                entry
            ))
        })
    }

    pub fn find_app(&self, slug: &str) -> Option<&RegisteredApp> {
        self.apps.iter().find(|a| a.slug == slug)
    }

    pub fn secure_cookies(&self) -> bool {
        self.environment == Environment::Prod
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.sso.deferred_ttl_seconds <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "SSO_DEFERRED_TTL_SECONDS must be positive"
            )));
        }

        if self.sso.recovery_dedupe_ttl_seconds <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "SSO_RECOVERY_DEDUPE_TTL_SECONDS must be positive"
            )));
        }

        // Surface bad allow-list entries at startup, not at first request
        self.redirect_allowlist()?;

        if self.environment == Environment::Prod {
            if self
                .security
                .cors_allowed_origins
                .iter()
                .any(|o| o == "*")
            {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Wildcard CORS origin not allowed in production"
                )));
            }

            if self.swagger.enabled == SwaggerMode::Public {
                tracing::warn!(
                    "Swagger is publicly accessible in production - consider disabling it"
                );
            }
        }

        Ok(())
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

impl std::str::FromStr for SwaggerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "public" => Ok(SwaggerMode::Public),
            "disabled" => Ok(SwaggerMode::Disabled),
            _ => Err(format!("Invalid swagger mode: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_app_callback_url_joins_path() {
        let app = RegisteredApp {
            slug: "trax".to_string(),
            name: "Trax".to_string(),
            url: "https://trax.supermatt.agency/".to_string(),
            callback_path: "/sso-callback".to_string(),
        };
        assert_eq!(app.callback_url(), "https://trax.supermatt.agency/sso-callback");
    }

    #[test]
    fn app_json_defaults_callback_path() {
        let app: RegisteredApp = serde_json::from_str(
            r#"{"slug":"trax","name":"Trax","url":"https://trax.supermatt.agency"}"#,
        )
        .unwrap();
        assert_eq!(app.callback_path, "/sso-callback");
    }
}
