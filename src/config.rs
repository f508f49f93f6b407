// config.rs
use std::fmt;
use std::time::Duration;

use crate::errors::{AppError, Result};

const SANDBOX_BASE_URL: &str = "https://sandbox.safaricom.co.ke";
const PRODUCTION_BASE_URL: &str = "https://api.safaricom.co.ke";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpesaEnvironment {
    Sandbox,
    Production,
}

impl MpesaEnvironment {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "sandbox" => Ok(MpesaEnvironment::Sandbox),
            "production" => Ok(MpesaEnvironment::Production),
            other => Err(AppError::configuration(format!(
                "MPESA_ENVIRONMENT must be sandbox or production, got {}",
                other
            ))),
        }
    }

    pub fn base_url(&self) -> &'static str {
        match self {
            MpesaEnvironment::Sandbox => SANDBOX_BASE_URL,
            MpesaEnvironment::Production => PRODUCTION_BASE_URL,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MpesaEnvironment::Sandbox => "sandbox",
            MpesaEnvironment::Production => "production",
        }
    }
}

/// Daraja credentials for one merchant shortcode. Loaded once at startup.
#[derive(Clone)]
pub struct GatewayCredentials {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub short_code: String,
    pub pass_key: String,
    pub callback_url: String,
    pub environment: MpesaEnvironment,
}

impl fmt::Debug for GatewayCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayCredentials")
            .field("consumer_key", &"[redacted]")
            .field("consumer_secret", &"[redacted]")
            .field("short_code", &self.short_code)
            .field("pass_key", &"[redacted]")
            .field("callback_url", &self.callback_url)
            .field("environment", &self.environment)
            .finish()
    }
}

/// Gateway endpoints resolved for the configured environment.
#[derive(Debug, Clone)]
pub struct MpesaUrls {
    pub auth_url: String,
    pub stk_push_url: String,
    pub stk_query_url: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub mpesa: GatewayCredentials,
    pub mpesa_base_url: Option<String>,
    pub http_timeout: Duration,
    pub cache_access_token: bool,
    pub database_url: Option<String>,
    pub database_name: String,
    pub host: String,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_source(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Required secrets that are
    /// missing or blank are reported together.
    pub fn from_source<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let required = [
            "MPESA_CONSUMER_KEY",
            "MPESA_CONSUMER_SECRET",
            "MPESA_SHORT_CODE",
            "MPESA_PASSKEY",
            "MPESA_CALLBACK_URL",
        ];
        let missing: Vec<&str> = required
            .iter()
            .copied()
            .filter(|key| get(*key).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(AppError::configuration(format!(
                "missing required settings: {}",
                missing.join(", ")
            )));
        }

        let environment =
            MpesaEnvironment::parse(&get("MPESA_ENVIRONMENT").unwrap_or_default())?;

        let http_timeout = match get("MPESA_HTTP_TIMEOUT_SECS") {
            Some(raw) => raw.parse::<u64>().map(Duration::from_secs).map_err(|_| {
                AppError::configuration("MPESA_HTTP_TIMEOUT_SECS must be a number")
            })?,
            None => Duration::from_secs(30),
        };

        let cache_access_token = match get("MPESA_CACHE_TOKEN") {
            Some(raw) => parse_flag(&raw).ok_or_else(|| {
                AppError::configuration("MPESA_CACHE_TOKEN must be true or false")
            })?,
            None => true,
        };

        let port = match get("PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|_| AppError::configuration("PORT must be a number"))?,
            None => 10000,
        };

        Ok(AppConfig {
            mpesa: GatewayCredentials {
                consumer_key: get("MPESA_CONSUMER_KEY").unwrap_or_default(),
                consumer_secret: get("MPESA_CONSUMER_SECRET").unwrap_or_default(),
                short_code: get("MPESA_SHORT_CODE").unwrap_or_default(),
                pass_key: get("MPESA_PASSKEY").unwrap_or_default(),
                callback_url: get("MPESA_CALLBACK_URL").unwrap_or_default(),
                environment,
            },
            mpesa_base_url: get("MPESA_BASE_URL").map(|url| url.trim_end_matches('/').to_string()),
            http_timeout,
            cache_access_token,
            database_url: get("DATABASE_URL"),
            database_name: get("DATABASE_NAME").unwrap_or_else(|| "checkout".to_string()),
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
        })
    }

    pub fn mpesa_urls(&self) -> MpesaUrls {
        let base_url = self
            .mpesa_base_url
            .as_deref()
            .unwrap_or_else(|| self.mpesa.environment.base_url());

        MpesaUrls {
            auth_url: format!("{}/oauth/v1/generate?grant_type=client_credentials", base_url),
            stk_push_url: format!("{}/mpesa/stkpush/v1/processrequest", base_url),
            stk_query_url: format!("{}/mpesa/stkpushquery/v1/query", base_url),
        }
    }

    pub fn is_production(&self) -> bool {
        self.mpesa.environment == MpesaEnvironment::Production
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn source(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn complete() -> HashMap<String, String> {
        source(&[
            ("MPESA_CONSUMER_KEY", "key"),
            ("MPESA_CONSUMER_SECRET", "secret"),
            ("MPESA_SHORT_CODE", "174379"),
            ("MPESA_PASSKEY", "passkey"),
            ("MPESA_CALLBACK_URL", "https://example.com/api/mpesa/callback"),
        ])
    }

    #[test]
    fn loads_defaults_for_optional_settings() {
        let vars = complete();
        let config = AppConfig::from_source(|k| vars.get(k).cloned()).unwrap();

        assert_eq!(config.mpesa.environment, MpesaEnvironment::Sandbox);
        assert_eq!(config.http_timeout, Duration::from_secs(30));
        assert!(config.cache_access_token);
        assert_eq!(config.port, 10000);
        assert!(config.database_url.is_none());
        assert_eq!(
            config.mpesa_urls().auth_url,
            "https://sandbox.safaricom.co.ke/oauth/v1/generate?grant_type=client_credentials"
        );
    }

    #[test]
    fn names_every_missing_secret() {
        let mut vars = complete();
        vars.remove("MPESA_PASSKEY");
        vars.insert("MPESA_CONSUMER_KEY".into(), "   ".into());

        let err = AppConfig::from_source(|k| vars.get(k).cloned()).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("MPESA_PASSKEY"));
        assert!(message.contains("MPESA_CONSUMER_KEY"));
        assert!(!message.contains("MPESA_SHORT_CODE"));
    }

    #[test]
    fn production_and_base_url_override() {
        let mut vars = complete();
        vars.insert("MPESA_ENVIRONMENT".into(), "production".into());
        let config = AppConfig::from_source(|k| vars.get(k).cloned()).unwrap();
        assert!(config.is_production());
        assert_eq!(
            config.mpesa_urls().stk_push_url,
            "https://api.safaricom.co.ke/mpesa/stkpush/v1/processrequest"
        );

        vars.insert("MPESA_BASE_URL".into(), "http://127.0.0.1:9000/".into());
        let config = AppConfig::from_source(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(
            config.mpesa_urls().stk_query_url,
            "http://127.0.0.1:9000/mpesa/stkpushquery/v1/query"
        );
    }

    #[test]
    fn rejects_unknown_environment() {
        let mut vars = complete();
        vars.insert("MPESA_ENVIRONMENT".into(), "staging".into());
        assert!(AppConfig::from_source(|k| vars.get(k).cloned()).is_err());
    }

    #[test]
    fn debug_output_hides_secrets() {
        let vars = complete();
        let config = AppConfig::from_source(|k| vars.get(k).cloned()).unwrap();
        let printed = format!("{:?}", config.mpesa);
        assert!(!printed.contains("\"secret\""));
        assert!(!printed.contains("\"passkey\""));
        assert!(printed.contains("174379"));
    }
}
