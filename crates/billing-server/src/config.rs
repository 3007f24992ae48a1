//! Server Configuration

/// Listener address used when `BIND_ADDR` is unset
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_addr: String,

    /// `(token, email)` pairs seeded into the dev user store
    pub dev_users: Vec<(String, String)>,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.into()),
            dev_users: std::env::var("DEV_USERS")
                .map(|raw| parse_dev_users(&raw))
                .unwrap_or_default(),
        }
    }
}

/// Parse `token=email,token2=email2`; malformed entries are skipped
fn parse_dev_users(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .filter_map(|entry| {
            let (token, email) = entry.split_once('=')?;
            let (token, email) = (token.trim(), email.trim());
            if token.is_empty() || email.is_empty() {
                tracing::warn!(entry, "Ignoring malformed DEV_USERS entry");
                return None;
            }
            Some((token.to_string(), email.to_string()))
        })
        .collect()
}
