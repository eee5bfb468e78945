use anyhow::Context;

pub const DEFAULT_PORT: u16 = 8005;
pub const DEFAULT_RECONCILE_HOUR_UTC: u32 = 2;
pub const DEFAULT_GRACE_DAYS: i64 = 10;
pub const DEFAULT_CONCURRENCY: usize = 4;
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinopsSettings {
    pub database_url: String,
    pub redis_url: String,
    pub port: u16,
    pub reconcile_hour_utc: u32,
    pub grace_days: i64,
    pub concurrency: usize,
    pub max_connections: u32,
}

impl FinopsSettings {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Out-of-range or unparsable optional values fall back to their default.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let required = |key: &str| {
            get(key)
                .filter(|s| !s.trim().is_empty())
                .with_context(|| format!("{} must be set", key))
        };

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            redis_url: required("REDIS_URL")?,
            port: parse_or(&get, "FINOPS_PORT", DEFAULT_PORT, |_| true),
            reconcile_hour_utc: parse_or(&get, "RECONCILE_HOUR_UTC", DEFAULT_RECONCILE_HOUR_UTC, |h| *h < 24),
            grace_days: parse_or(&get, "BILLING_GRACE_DAYS", DEFAULT_GRACE_DAYS, |d| (0..=365).contains(d)),
            concurrency: parse_or(&get, "RECONCILE_CONCURRENCY", DEFAULT_CONCURRENCY, |c| (1..=64).contains(c)),
            max_connections: parse_or(&get, "DB_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS, |c| *c >= 1),
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
    valid: impl Fn(&T) -> bool,
) -> T {
    get(key)
        .and_then(|s| s.trim().parse::<T>().ok())
        .filter(|v| valid(v))
        .unwrap_or(default)
}
