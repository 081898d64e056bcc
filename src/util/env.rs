//! Environment helpers: centralized dotenv loading and ergonomic getters.
//! Call `init_env()` once early in each binary (or rely on lazy Once).
use std::str::FromStr;
use std::sync::Once;
use tracing::info;

static INIT: Once = Once::new();

/// Load .env exactly once; falls back to the crate root when the working
/// directory has none. Safe to call many times.
pub fn init_env() {
    INIT.call_once(|| {
        if dotenv::dotenv().is_err() {
            let candidate = format!("{}/.env", env!("CARGO_MANIFEST_DIR"));
            let _ = dotenv::from_filename(candidate);
        }
    });
}

/// Get required env var; error if missing or blank.
pub fn env_req(key: &str) -> anyhow::Result<String> {
    env_opt(key).ok_or_else(|| anyhow::anyhow!("missing env var {key}"))
}

/// Get optional env var (None if unset or empty).
pub fn env_opt(key: &str) -> Option<String> {
    init_env();
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => None,
    }
}

/// Get parsed value with default fallback.
pub fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Clone,
{
    init_env();
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Boolean flag; accepts 1/true/on/yes (case-insensitive) as true.
pub fn env_flag(key: &str, default: bool) -> bool {
    init_env();
    match std::env::var(key) {
        Ok(raw) => parse_flag(&raw),
        Err(_) => default,
    }
}

fn parse_flag(raw: &str) -> bool {
    let v = raw.trim().to_ascii_lowercase();
    matches!(v.as_str(), "1" | "true" | "on" | "yes")
}

pub(crate) fn redact_value(key: &str, val: &str) -> String {
    let k = key.to_ascii_uppercase();
    if k.contains("PASSWORD")
        || k.contains("SECRET")
        || k.contains("KEY")
        || k.contains("TOKEN")
    {
        return if val.trim().is_empty() {
            String::new()
        } else {
            "***".to_string()
        };
    }

    let val_trim = val.trim();

    // URLs may embed credentials in userinfo or query (e.g. ?apikey=...).
    if let Ok(mut u) = url::Url::parse(val_trim) {
        if !u.username().is_empty() || u.password().is_some() {
            let _ = u.set_username("***");
            let _ = u.set_password(Some("***"));
        }
        if u.query().is_some() {
            u.set_query(Some("***"));
        }
        return u.to_string();
    }

    val_trim.to_string()
}

/// Validate required keys and log a consolidated, redacted snapshot of configuration.
/// Returns error if any required key is missing.
pub fn preflight_check(title: &str, required: &[&str], also_log: &[&str]) -> anyhow::Result<()> {
    init_env();
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|k| env_opt(k).is_none())
        .collect();
    let snapshot: Vec<(String, String)> = also_log
        .iter()
        .map(|&k| {
            let v = env_opt(k).unwrap_or_default();
            (k.to_string(), redact_value(k, &v))
        })
        .collect();
    info!(target: "preflight", title, snapshot = ?snapshot, "configuration snapshot");
    if !missing.is_empty() {
        return Err(anyhow::anyhow!("missing required env: {:?}", missing));
    }
    Ok(())
}
