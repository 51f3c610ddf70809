use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::billing::ApprovalPolicyKind;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub billing: BillingConfig,
}

const DEFAULT_TIMEOUT_SECS: u64 = 10;
const MAX_TIMEOUT_SECS: u64 = 60;
const DEFAULT_MAX_PROOF_BYTES: usize = 5 * 1024 * 1024;

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            billing: BillingConfig::from_env()?,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Knobs for the subscription workflow.
#[derive(Debug, Clone)]
pub struct BillingConfig {
    pub request_timeout: Duration,
    pub approval_policy: ApprovalPolicyKind,
    pub admin_email: Option<String>,
    pub manager_email: Option<String>,
    pub proof_directory: String,
    pub max_proof_bytes: usize,
    pub seed_path: Option<PathBuf>,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            approval_policy: ApprovalPolicyKind::AnyReviewer,
            admin_email: None,
            manager_email: None,
            proof_directory: "uploads/payment_proofs".to_string(),
            max_proof_bytes: DEFAULT_MAX_PROOF_BYTES,
            seed_path: None,
        }
    }
}

impl BillingConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let timeout_secs = match env::var("APP_REQUEST_TIMEOUT_SECS") {
            Ok(raw) => raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| (1..=MAX_TIMEOUT_SECS).contains(secs))
                .ok_or(ConfigError::InvalidTimeout)?,
            Err(_) => DEFAULT_TIMEOUT_SECS,
        };

        let approval_policy = match env::var("APP_APPROVAL_POLICY") {
            Ok(raw) => ApprovalPolicyKind::parse(&raw)
                .ok_or(ConfigError::InvalidApprovalPolicy { value: raw })?,
            Err(_) => defaults.approval_policy,
        };

        let max_proof_bytes = match env::var("APP_MAX_PROOF_BYTES") {
            Ok(raw) => raw
                .trim()
                .parse::<usize>()
                .map_err(|_| ConfigError::InvalidProofLimit)?,
            Err(_) => defaults.max_proof_bytes,
        };

        Ok(Self {
            request_timeout: Duration::from_secs(timeout_secs),
            approval_policy,
            admin_email: non_empty_var("ADMIN_EMAIL"),
            manager_email: non_empty_var("MANAGER_EMAIL"),
            proof_directory: non_empty_var("APP_PROOF_DIR").unwrap_or(defaults.proof_directory),
            max_proof_bytes,
            seed_path: non_empty_var("APP_SEED_PATH").map(PathBuf::from),
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidTimeout,
    InvalidApprovalPolicy { value: String },
    InvalidProofLimit,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidTimeout => write!(
                f,
                "APP_REQUEST_TIMEOUT_SECS must be between 1 and {MAX_TIMEOUT_SECS}"
            ),
            ConfigError::InvalidApprovalPolicy { value } => write!(
                f,
                "APP_APPROVAL_POLICY '{value}' must be 'any_reviewer' or 'unanimous'"
            ),
            ConfigError::InvalidProofLimit => {
                write!(f, "APP_MAX_PROOF_BYTES must be a non-negative integer")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidTimeout
            | ConfigError::InvalidApprovalPolicy { .. }
            | ConfigError::InvalidProofLimit => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for key in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "APP_REQUEST_TIMEOUT_SECS",
            "APP_APPROVAL_POLICY",
            "ADMIN_EMAIL",
            "MANAGER_EMAIL",
            "APP_PROOF_DIR",
            "APP_MAX_PROOF_BYTES",
            "APP_SEED_PATH",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.billing.request_timeout, Duration::from_secs(10));
        assert_eq!(config.billing.approval_policy, ApprovalPolicyKind::AnyReviewer);
        assert_eq!(config.billing.max_proof_bytes, 5 * 1024 * 1024);
        assert!(config.billing.admin_email.is_none());
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
        reset_env();
    }

    #[test]
    fn reads_billing_overrides() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_REQUEST_TIMEOUT_SECS", "15");
        env::set_var("APP_APPROVAL_POLICY", "unanimous");
        env::set_var("ADMIN_EMAIL", "ops@example.com");
        env::set_var("MANAGER_EMAIL", "  ");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.billing.request_timeout, Duration::from_secs(15));
        assert_eq!(config.billing.approval_policy, ApprovalPolicyKind::Unanimous);
        assert_eq!(config.billing.admin_email.as_deref(), Some("ops@example.com"));
        assert!(config.billing.manager_email.is_none());
        reset_env();
    }

    #[test]
    fn rejects_out_of_range_timeout_and_unknown_policy() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_REQUEST_TIMEOUT_SECS", "0");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::InvalidTimeout)
        ));

        reset_env();
        env::set_var("APP_APPROVAL_POLICY", "majority");
        match AppConfig::load() {
            Err(ConfigError::InvalidApprovalPolicy { value }) => assert_eq!(value, "majority"),
            other => panic!("expected policy error, got {other:?}"),
        }
        reset_env();
    }
}
