//! Environment-based Configuration for the Transparency Service
//!
//! All sensitive values (the service signing key in particular) come from
//! environment variables, never from hardcoded values.
//!
//! # Environment Variables
//!
//! - `SCITT_ORIGIN` - Log origin URL bound into checkpoints and receipts
//!   (default: "https://scitt.localhost")
//! - `SCITT_PORT` - HTTP listen port (default: 8080)
//! - `SCITT_DATA_DIR` - Tile/blob storage directory; in-memory when unset
//! - `SCITT_DB_PATH` - SQLite metadata index path; in-memory when unset
//! - `SCITT_SERVICE_KEY` - Hex-encoded P-256 scalar; an ephemeral key is
//!   generated when unset (receipts do not survive restarts then)
//! - `SCITT_REGISTRATION_POLICY` - "accept-all" or "require-signature"
//!   (default: "accept-all")
//! - `SCITT_LOG_LEVEL` - Logging level (debug, info, warn, error)
//! - `SCITT_LOG_JSON` - Set to "1" for JSON log output

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("not production ready: {0}")]
    NotProductionReady(String),
}

/// Statement acceptance policy selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyMode {
    /// Accept any well-formed statement with the required claims
    AcceptAll,
    /// Additionally require a valid statement signature from a trusted key
    RequireSignature,
}

impl FromStr for PolicyMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "accept-all" | "accept_all" | "none" => Ok(PolicyMode::AcceptAll),
            "require-signature" | "require_signature" => Ok(PolicyMode::RequireSignature),
            _ => Err(ConfigError::InvalidValue(
                "SCITT_REGISTRATION_POLICY".to_string(),
                format!("unknown policy: {}", s),
            )),
        }
    }
}

impl PolicyMode {
    /// Name reported by the configuration endpoint
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyMode::AcceptAll => "accept-all",
            PolicyMode::RequireSignature => "require-signature",
        }
    }
}

/// Main configuration struct
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Log origin URL
    pub origin: String,

    /// HTTP listen port
    pub port: u16,

    /// Blob storage directory; in-memory store when None
    pub data_dir: Option<PathBuf>,

    /// SQLite index path; in-memory index when None
    pub db_path: Option<PathBuf>,

    /// Hex-encoded service signing key; ephemeral when None
    pub service_key_hex: Option<String>,

    /// Statement acceptance policy
    pub policy: PolicyMode,

    /// Log level
    pub log_level: String,

    /// Emit JSON logs
    pub log_json: bool,
}

impl ServiceConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let origin =
            env::var("SCITT_ORIGIN").unwrap_or_else(|_| "https://scitt.localhost".to_string());
        if origin.is_empty() {
            return Err(ConfigError::InvalidValue(
                "SCITT_ORIGIN".to_string(),
                "origin must not be empty".to_string(),
            ));
        }

        let port = match env::var("SCITT_PORT") {
            Ok(value) => value
                .parse()
                .map_err(|_| ConfigError::InvalidValue("SCITT_PORT".to_string(), value.clone()))?,
            Err(_) => 8080,
        };

        let data_dir = env::var("SCITT_DATA_DIR").ok().map(PathBuf::from);
        let db_path = env::var("SCITT_DB_PATH").ok().map(PathBuf::from);

        let service_key_hex = match env::var("SCITT_SERVICE_KEY") {
            Ok(key) if !key.is_empty() => {
                let bytes = hex::decode(&key).map_err(|e| {
                    ConfigError::InvalidValue("SCITT_SERVICE_KEY".to_string(), e.to_string())
                })?;
                if bytes.len() != 32 {
                    return Err(ConfigError::InvalidValue(
                        "SCITT_SERVICE_KEY".to_string(),
                        format!("key is {} bytes, expected 32", bytes.len()),
                    ));
                }
                Some(key)
            }
            _ => None,
        };

        let policy: PolicyMode = env::var("SCITT_REGISTRATION_POLICY")
            .unwrap_or_else(|_| "accept-all".to_string())
            .parse()?;

        let log_level = env::var("SCITT_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let log_json = env::var("SCITT_LOG_JSON").map(|v| v == "1").unwrap_or(false);

        Ok(Self {
            origin,
            port,
            data_dir,
            db_path,
            service_key_hex,
            policy,
            log_level,
            log_json,
        })
    }

    /// Validate configuration for production readiness
    pub fn validate_for_production(&self) -> Result<(), ConfigError> {
        if self.service_key_hex.is_none() {
            return Err(ConfigError::NotProductionReady(
                "SCITT_SERVICE_KEY is required; ephemeral keys invalidate receipts on restart"
                    .to_string(),
            ));
        }
        if self.data_dir.is_none() {
            return Err(ConfigError::NotProductionReady(
                "SCITT_DATA_DIR is required; the in-memory store loses the log on restart"
                    .to_string(),
            ));
        }
        if self.db_path.is_none() {
            return Err(ConfigError::NotProductionReady(
                "SCITT_DB_PATH is required for a durable metadata index".to_string(),
            ));
        }
        if self.origin == "https://scitt.localhost" {
            return Err(ConfigError::NotProductionReady(
                "SCITT_ORIGIN must name the public log URL".to_string(),
            ));
        }
        Ok(())
    }

    /// Print configuration summary (hiding sensitive values)
    pub fn print_summary(&self) {
        println!("=== SCITT Log Configuration ===");
        println!("Origin: {}", self.origin);
        println!("Port: {}", self.port);
        println!(
            "Blob store: {}",
            self.data_dir
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "in-memory".to_string())
        );
        println!(
            "Metadata index: {}",
            self.db_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "in-memory".to_string())
        );
        println!(
            "Service key: {}",
            if self.service_key_hex.is_some() {
                "configured"
            } else {
                "ephemeral (generated at startup)"
            }
        );
        println!("Registration policy: {}", self.policy.as_str());
        println!("Log level: {}", self.log_level);
        println!("===============================");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_parsing() {
        assert!(matches!(
            "accept-all".parse::<PolicyMode>(),
            Ok(PolicyMode::AcceptAll)
        ));
        assert!(matches!(
            "require-signature".parse::<PolicyMode>(),
            Ok(PolicyMode::RequireSignature)
        ));
        assert!("open-bar".parse::<PolicyMode>().is_err());
    }

    #[test]
    fn test_production_validation() {
        let config = ServiceConfig {
            origin: "https://scitt.localhost".to_string(),
            port: 8080,
            data_dir: None,
            db_path: None,
            service_key_hex: None,
            policy: PolicyMode::AcceptAll,
            log_level: "info".to_string(),
            log_json: false,
        };
        assert!(config.validate_for_production().is_err());

        let config = ServiceConfig {
            origin: "https://transparency.example".to_string(),
            data_dir: Some(PathBuf::from("/var/lib/scitt")),
            db_path: Some(PathBuf::from("/var/lib/scitt/index.db")),
            service_key_hex: Some("11".repeat(32)),
            ..config
        };
        assert!(config.validate_for_production().is_ok());
    }
}
