use anyhow::{ensure, Context};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub from: String,
    /// Base URL of the web client, used to build links in outgoing mail.
    pub frontend_url: String,
}

/// Longest reservation span. Not configurable.
pub const MAX_RESERVATION_DAYS: i64 = 28;

/// Library rules applied by the lifecycle engine.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LoanPolicy {
    pub fine_per_day: f64,
    /// Refund sent to a reserver when the copy has no cost recorded.
    pub default_refund: f64,
}

impl Default for LoanPolicy {
    fn default() -> Self {
        Self {
            fine_per_day: 5.0,
            default_refund: 100.0,
        }
    }
}

impl LoanPolicy {
    pub fn new(fine_per_day: f64, default_refund: f64) -> anyhow::Result<Self> {
        ensure!(
            fine_per_day.is_finite() && fine_per_day >= 0.0,
            "FINE_PER_DAY must be a non-negative number, got {fine_per_day}"
        );
        ensure!(
            default_refund.is_finite() && default_refund >= 0.0,
            "DEFAULT_REFUND must be a non-negative number, got {default_refund}"
        );
        Ok(Self {
            fine_per_day,
            default_refund,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub mail: MailConfig,
    pub policy: LoanPolicy,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "library-catalog".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "library-users".into()),
            ttl_minutes: env_or("JWT_TTL_MINUTES", 60),
            refresh_ttl_minutes: env_or("JWT_REFRESH_TTL_MINUTES", 60 * 24 * 14),
        };
        let mail = MailConfig {
            smtp_host: std::env::var("SMTP_HOST").unwrap_or_else(|_| "localhost".into()),
            smtp_port: env_or("SMTP_PORT", 587),
            smtp_username: std::env::var("SMTP_USERNAME").unwrap_or_default(),
            smtp_password: std::env::var("SMTP_PASSWORD").unwrap_or_default(),
            from: std::env::var("MAIL_FROM")
                .unwrap_or_else(|_| "Library <no-reply@library.local>".into()),
            frontend_url: std::env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".into()),
        };
        let defaults = LoanPolicy::default();
        let policy = LoanPolicy::new(
            env_or("FINE_PER_DAY", defaults.fine_per_day),
            env_or("DEFAULT_REFUND", defaults.default_refund),
        )?;
        Ok(Self {
            database_url,
            jwt,
            mail,
            policy,
        })
    }
}
