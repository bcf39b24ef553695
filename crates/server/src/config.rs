//! Environment-driven configuration (A1), one field per concern, mirroring
//! the `#[serde(default = "fn")]` style the rest of the stack uses for its
//! knobs. Nothing here touches a config file — every var in §6 is read
//! straight from the process environment at startup.

use std::env;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

fn env_var(name: &'static str) -> Result<Option<String>, ConfigError> {
    match env::var(name) {
        Ok(v) if v.is_empty() => Ok(None),
        Ok(v) => Ok(Some(v)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(env::VarError::NotUnicode(_)) => Err(ConfigError::Invalid {
            name,
            value: "<non-utf8>".into(),
        }),
    }
}

fn parse_or<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env_var(name)? {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid { name, value: raw }),
    }
}

fn parse_bool_or(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env_var(name)? {
        None => Ok(default),
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid { name, value: raw }),
        },
    }
}

/// Which storage and queue drivers to use; only `memory` is implemented
/// in-tree (§1 Non-goals name durable driver internals out of scope).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverKind {
    Memory,
    External,
}

impl DriverKind {
    fn parse(name: &'static str, raw: &str) -> Result<Self, ConfigError> {
        match raw.to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "postgres" | "s3" | "redis" | "external" => Ok(Self::External),
            _ => Err(ConfigError::Invalid {
                name,
                value: raw.to_owned(),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub cookie_domain: Option<String>,
    pub cookie_secure: bool,
    pub admin_session_ttl: Duration,
    pub recipient_session_ttl: Duration,
    pub admin_magiclink_ttl: Duration,
    pub recipient_otp_ttl: Duration,
    pub recipient_otp_length: usize,
    pub device_code_ttl: Duration,
    pub device_code_interval: Duration,
    pub api_token_ttl: Option<Duration>,
    pub api_token_scopes_default: Vec<String>,
    pub api_token_prefix: String,
}

#[derive(Debug, Clone)]
pub struct AuthzConfig {
    pub v2_enabled: bool,
    pub v2_shadow: bool,
    pub require_admin_2fa: bool,
    pub reauth_window: Duration,
    pub metrics_enabled: bool,
}

#[derive(Debug, Clone)]
pub struct HistoryConfig {
    pub snapshot_interval: u32,
    pub max_chain_depth: u32,
    pub system_user_id: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub port: u16,
    pub plugins_path: String,
    pub queue_driver: DriverKind,
    pub queue_config_json: Option<String>,
    pub storage_driver: DriverKind,
    pub storage_config_json: Option<String>,
    pub encryption_master_key_b64: Option<String>,
    pub auth: AuthConfig,
    pub authz: AuthzConfig,
    pub history: HistoryConfig,
}

impl Config {
    /// Load configuration from the process environment, per §6's variable
    /// table. `DATABASE_URL` is read but left optional: the in-memory
    /// reference store runs without it, a durable driver would require it.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = env_var("DATABASE_URL")?;
        let port = parse_or("PORT", 3001u16)?;
        let plugins_path = env_var("PLUGINS_PATH")?.unwrap_or_else(|| "./plugins".to_owned());

        let queue_driver_raw = env_var("QUEUE_DRIVER")?.unwrap_or_else(|| "memory".to_owned());
        let queue_driver = DriverKind::parse("QUEUE_DRIVER", &queue_driver_raw)?;
        let queue_config_json = env_var("QUEUE_CONFIG_JSON")?;

        let storage_driver_raw = env_var("STORAGE_DRIVER")?.unwrap_or_else(|| "memory".to_owned());
        let storage_driver = DriverKind::parse("STORAGE_DRIVER", &storage_driver_raw)?;
        let storage_config_json = env_var("STORAGE_CONFIG_JSON")?;

        let encryption_mode = env_var("ENCRYPTION_MODE")?.unwrap_or_else(|| "disabled".to_owned());
        let encryption_master_key_b64 = env_var("ENCRYPTION_MASTER_KEY_B64")?;
        if encryption_mode.eq_ignore_ascii_case("required") && encryption_master_key_b64.is_none() {
            return Err(ConfigError::Missing("ENCRYPTION_MASTER_KEY_B64"));
        }

        let auth = AuthConfig {
            cookie_domain: env_var("AUTH_COOKIE_DOMAIN")?,
            cookie_secure: parse_bool_or("AUTH_COOKIE_SECURE", true)?,
            admin_session_ttl: Duration::from_secs(u64::from(parse_or("AUTH_SESSION_TTL_HOURS", 12u32)?) * 3600),
            recipient_session_ttl: Duration::from_secs(
                u64::from(parse_or("RECIPIENT_SESSION_TTL_HOURS", 2u32)?) * 3600,
            ),
            admin_magiclink_ttl: Duration::from_secs(u64::from(parse_or("ADMIN_MAGICLINK_TTL_MIN", 15u32)?) * 60),
            recipient_otp_ttl: Duration::from_secs(u64::from(parse_or("RECIPIENT_OTP_TTL_MIN", 10u32)?) * 60),
            recipient_otp_length: parse_or("RECIPIENT_OTP_LENGTH", 6usize)?,
            device_code_ttl: Duration::from_secs(u64::from(parse_or("DEVICE_CODE_TTL_MIN", 10u32)?) * 60),
            device_code_interval: Duration::from_secs(u64::from(parse_or("DEVICE_CODE_INTERVAL_SEC", 5u32)?)),
            api_token_ttl: match env_var("API_TOKEN_TTL_DAYS")? {
                Some(raw) => {
                    let days: u64 = raw
                        .parse()
                        .map_err(|_| ConfigError::Invalid { name: "API_TOKEN_TTL_DAYS", value: raw })?;
                    Some(Duration::from_secs(days * 86400))
                }
                None => None,
            },
            api_token_scopes_default: env_var("API_TOKEN_SCOPES_DEFAULT")?
                .map(|raw| raw.split(',').map(str::trim).map(str::to_owned).filter(|s| !s.is_empty()).collect())
                .unwrap_or_default(),
            api_token_prefix: env_var("API_TOKEN_PREFIX")?.unwrap_or_else(|| "lfk_".to_owned()),
        };

        let authz = AuthzConfig {
            v2_enabled: parse_bool_or("AUTHZ_V2", false)?,
            v2_shadow: parse_bool_or("AUTHZ_V2_SHADOW", false)?,
            require_admin_2fa: parse_bool_or("AUTHZ_REQUIRE_ADMIN_2FA", false)?,
            reauth_window: Duration::from_secs(u64::from(parse_or("AUTHZ_REAUTH_WINDOW_MIN", 30u32)?) * 60),
            metrics_enabled: parse_bool_or("AUTHZ_METRICS_ENABLED", true)?,
        };

        let history = HistoryConfig {
            snapshot_interval: parse_or("HISTORY_SNAPSHOT_INTERVAL", 20u32)?,
            max_chain_depth: parse_or("HISTORY_MAX_CHAIN_DEPTH", 200u32)?,
            system_user_id: env_var("SYSTEM_USER_ID")?.unwrap_or_else(|| "system".to_owned()),
        };

        Ok(Self {
            database_url,
            port,
            plugins_path,
            queue_driver,
            queue_config_json,
            storage_driver,
            storage_config_json,
            encryption_master_key_b64,
            auth,
            authz,
            history,
        })
    }

    #[must_use]
    pub fn evaluation_mode(&self) -> latchflow_authz::EvaluationMode {
        match (self.authz.v2_enabled, self.authz.v2_shadow) {
            (true, _) => latchflow_authz::EvaluationMode::Enforce,
            (false, true) => latchflow_authz::EvaluationMode::Shadow,
            (false, false) => latchflow_authz::EvaluationMode::Off,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_env_absent() {
        // PORT/AUTH_SESSION_TTL_HOURS etc. are not set in the test process;
        // parse_or must fall back to documented defaults rather than erroring.
        assert_eq!(parse_or::<u16>("LATCHFLOW_TEST_UNSET_PORT", 3001).unwrap(), 3001);
    }

    #[test]
    fn invalid_bool_is_rejected() {
        env::set_var("LATCHFLOW_TEST_BOOL", "maybe");
        let err = parse_bool_or("LATCHFLOW_TEST_BOOL", true).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
        env::remove_var("LATCHFLOW_TEST_BOOL");
    }

    #[test]
    fn evaluation_mode_prefers_enforce_over_shadow() {
        let mut cfg_authz = AuthzConfig {
            v2_enabled: true,
            v2_shadow: true,
            require_admin_2fa: false,
            reauth_window: Duration::from_secs(1800),
            metrics_enabled: true,
        };
        let mut cfg = sample_config();
        cfg.authz = cfg_authz.clone();
        assert_eq!(cfg.evaluation_mode(), latchflow_authz::EvaluationMode::Enforce);

        cfg_authz.v2_enabled = false;
        cfg.authz = cfg_authz;
        assert_eq!(cfg.evaluation_mode(), latchflow_authz::EvaluationMode::Shadow);
    }

    fn sample_config() -> Config {
        Config {
            database_url: None,
            port: 3001,
            plugins_path: "./plugins".into(),
            queue_driver: DriverKind::Memory,
            queue_config_json: None,
            storage_driver: DriverKind::Memory,
            storage_config_json: None,
            encryption_master_key_b64: None,
            auth: AuthConfig {
                cookie_domain: None,
                cookie_secure: true,
                admin_session_ttl: Duration::from_secs(12 * 3600),
                recipient_session_ttl: Duration::from_secs(2 * 3600),
                admin_magiclink_ttl: Duration::from_secs(15 * 60),
                recipient_otp_ttl: Duration::from_secs(10 * 60),
                recipient_otp_length: 6,
                device_code_ttl: Duration::from_secs(10 * 60),
                device_code_interval: Duration::from_secs(5),
                api_token_ttl: None,
                api_token_scopes_default: Vec::new(),
                api_token_prefix: "lfk_".into(),
            },
            authz: AuthzConfig {
                v2_enabled: false,
                v2_shadow: false,
                require_admin_2fa: false,
                reauth_window: Duration::from_secs(1800),
                metrics_enabled: true,
            },
            history: HistoryConfig {
                snapshot_interval: 20,
                max_chain_depth: 200,
                system_user_id: "system".into(),
            },
        }
    }
}
