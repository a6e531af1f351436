use std::path::PathBuf;

const SENTINEL_BIND: &str = "SENTINEL_BIND";

const DEFAULT_BIND: &str = "0.0.0.0:8080";

pub fn get_default_bind() -> String {
    DEFAULT_BIND.to_string()
}

/// API bind address, `SENTINEL_BIND` overriding `configured`
pub fn get_bind(configured: &str) -> String {
    std::env::var(SENTINEL_BIND)
        .ok()
        .filter(|bind| !bind.is_empty())
        .unwrap_or_else(|| configured.to_string())
}

const SENTINEL_DB: &str = "SENTINEL_DB";

/// SQLite path override from `SENTINEL_DB`
pub fn get_db_path() -> Option<PathBuf> {
    std::env::var(SENTINEL_DB)
        .ok()
        .filter(|path| !path.is_empty())
        .map(PathBuf::from)
}

const SENTINEL_AGENT_TOKEN: &str = "SENTINEL_AGENT_TOKEN";

/// Agent token override from `SENTINEL_AGENT_TOKEN`
pub fn get_agent_token() -> Option<String> {
    std::env::var(SENTINEL_AGENT_TOKEN)
        .ok()
        .filter(|token| !token.is_empty())
}
