// src/config.rs
use crate::error::{AppError, AppResult};
use chrono::{FixedOffset, Offset, Utc};
use std::{env, fmt::Display, net::SocketAddr, str::FromStr};
use tracing::{info, warn};

/// SMTP settings for the daily report. Present only when fully configured.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub smtp_host: String,
    pub username: String,
    pub password: String,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct ReportSchedule {
    pub enabled: bool,
    pub hour: u32,
    pub minute: u32,
    pub utc_offset_hours: i32,
}

impl ReportSchedule {
    /// The school's local offset. Out-of-range values are rejected at load time.
    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_hours * 3600).unwrap_or_else(|| Utc.fix())
    }
}

#[derive(Debug, Clone)]
pub struct BootstrapAdmin {
    pub login_id: String,
    pub password: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub session_secret: String,
    pub session_secure: bool,
    pub admin: Option<BootstrapAdmin>,
    pub report: ReportSchedule,
    pub mail: Option<MailConfig>,
}

impl Config {
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup (the process env in production).
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = required(&lookup, "DATABASE_URL")?;

        let session_secret = required(&lookup, "SESSION_SECRET")?;
        if session_secret.len() < 64 {
            return Err(AppError::Config(
                "SESSION_SECRET must be at least 64 bytes".to_string(),
            ));
        }

        let admin = match (lookup("ADMIN_LOGIN_ID"), lookup("ADMIN_PASSWORD")) {
            (Some(login_id), Some(password)) if !login_id.trim().is_empty() => {
                Some(BootstrapAdmin {
                    login_id: login_id.trim().to_string(),
                    password,
                    name: lookup("ADMIN_NAME").unwrap_or_else(|| "관리자".to_string()),
                })
            }
            _ => None,
        };

        let report = ReportSchedule {
            enabled: try_load(&lookup, "REPORT_ENABLED", "true")?,
            hour: try_load(&lookup, "REPORT_HOUR", "8")?,
            minute: try_load(&lookup, "REPORT_MINUTE", "0")?,
            utc_offset_hours: try_load(&lookup, "REPORT_UTC_OFFSET_HOURS", "9")?,
        };
        if report.hour > 23 || report.minute > 59 {
            return Err(AppError::Config(format!(
                "Invalid report time {:02}:{:02}",
                report.hour, report.minute
            )));
        }
        if !(-12..=14).contains(&report.utc_offset_hours) {
            return Err(AppError::Config(format!(
                "Invalid REPORT_UTC_OFFSET_HOURS {}",
                report.utc_offset_hours
            )));
        }

        let mail = match (
            lookup("SMTP_HOST"),
            lookup("SMTP_USERNAME"),
            lookup("SMTP_PASSWORD"),
        ) {
            (Some(smtp_host), Some(username), Some(password)) => {
                let from = lookup("SMTP_FROM").unwrap_or_else(|| username.clone());
                Some(MailConfig {
                    smtp_host,
                    username,
                    password,
                    from,
                })
            }
            _ => {
                warn!("SMTP not fully configured, report mails are disabled");
                None
            }
        };

        Ok(Self {
            database_url,
            bind_addr: try_load(&lookup, "BIND_ADDR", "0.0.0.0:3000")?,
            session_secret,
            session_secure: try_load(&lookup, "SESSION_SECURE", "false")?,
            admin,
            report,
            mail,
        })
    }
}

fn required<F>(lookup: &F, key: &str) -> AppResult<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).ok_or_else(|| AppError::Config(format!("{key} is not set")))
}

fn try_load<F, T>(lookup: &F, key: &str, default: &str) -> AppResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    lookup(key)
        .unwrap_or_else(|| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .trim()
        .parse()
        .map_err(|e| AppError::Config(format!("Invalid {key} value: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn secret() -> String {
        "s".repeat(64)
    }

    #[test]
    fn defaults_apply_when_only_required_keys_are_set() {
        let secret = secret();
        let config = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "sqlite://merit.db"),
            ("SESSION_SECRET", &secret),
        ]))
        .unwrap();

        assert_eq!(config.bind_addr, "0.0.0.0:3000".parse().unwrap());
        assert!(!config.session_secure);
        assert!(config.report.enabled);
        assert_eq!((config.report.hour, config.report.minute), (8, 0));
        assert_eq!(config.report.utc_offset_hours, 9);
        assert!(config.mail.is_none());
        assert!(config.admin.is_none());
    }

    #[test]
    fn missing_database_url_is_an_error() {
        let secret = secret();
        let err = Config::from_lookup(lookup_from(&[("SESSION_SECRET", &secret)])).unwrap_err();
        assert!(matches!(err, AppError::Config(msg) if msg.contains("DATABASE_URL")));
    }

    #[test]
    fn short_session_secret_is_rejected() {
        let err = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("SESSION_SECRET", "short"),
        ]))
        .unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn mail_requires_host_user_and_password() {
        let secret = secret();
        let config = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("SESSION_SECRET", &secret),
            ("SMTP_HOST", "smtp.gmail.com"),
            ("SMTP_USERNAME", "school@example.com"),
            ("SMTP_PASSWORD", "app-password"),
        ]))
        .unwrap();

        let mail = config.mail.expect("mail configured");
        assert_eq!(mail.from, "school@example.com");
    }

    #[test]
    fn out_of_range_report_hour_is_rejected() {
        let secret = secret();
        let err = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("SESSION_SECRET", &secret),
            ("REPORT_HOUR", "24"),
        ]))
        .unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }
}
