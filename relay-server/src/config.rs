use relay_core::RelayConfig;

/// Environment prefix: `RELAY__HTTP__PORT=3040` sets `http.port`.
pub const ENV_PREFIX: &str = "RELAY__";

/// Settings from the environment, with defaults for everything a local run
/// needs.
pub fn config() -> RelayConfig {
    with_defaults(RelayConfig::from_env(ENV_PREFIX))
}

pub fn with_defaults(mut cfg: RelayConfig) -> RelayConfig {
    // HTTP server
    cfg.set_default("http.host", "127.0.0.1");
    cfg.set_default("http.port", "3040");

    // Gateway
    cfg.set_default("gateway.base_url", "http://127.0.0.1:8080");
    cfg.set_default("fallback.mode", "permissive");

    // Tenants
    cfg.set_default("tenants.cache_ttl_ms", "60000");
    cfg.set_default("onboarding.path", "/onboarding");

    // Auth
    cfg.set_default("auth.jwt.issuer", "relay-auth");
    cfg.set_default("auth.jwt.audience", "relay-gateway");
    cfg.set_default("auth.jwt.secret", "relay-dev-secret-change-me");

    // Connectors
    cfg.set_default("connectors.failure_threshold", "3");

    cfg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_overrides_defaults() {
        let cfg = with_defaults(RelayConfig::from_vars(
            ENV_PREFIX,
            vec![
                ("RELAY__HTTP__PORT".to_string(), "9000".to_string()),
                ("RELAY__FALLBACK__MODE".to_string(), "strict".to_string()),
                ("HOME".to_string(), "/root".to_string()),
            ],
        ));
        let snap = cfg.snapshot();
        assert_eq!(snap.get("http.port"), Some("9000"));
        assert_eq!(snap.get("http.host"), Some("127.0.0.1"));
        assert_eq!(snap.get("fallback.mode"), Some("strict"));
        assert!(snap.get("home").is_none());
    }
}
