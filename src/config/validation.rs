//! Configuration validation functions.

use super::Config;

/// Validate configuration security and warn about potential misconfiguration.
///
/// Returns an error (rather than merely warning) when running in production
/// mode with a JWT secret that is missing or clearly too weak — a server
/// that silently treats every bearer token as invalid and falls back to
/// anonymous identities is a worse failure mode than refusing to start.
pub fn validate_config_security(config: &Config) -> anyhow::Result<()> {
    let is_prod = is_production_mode();

    let secret_present = config
        .auth
        .jwt_secret
        .as_deref()
        .map(|s| !s.trim().is_empty())
        .unwrap_or(false);

    if !secret_present {
        if is_prod {
            anyhow::bail!(
                "\nCRITICAL: no JWT secret configured in production!\n\
                 ===================================================================\n\
                 Every bearer token will fail verification and connections will be\n\
                 treated as anonymous. Configure a secret:\n\
                 export ROOMFORGE__AUTH__JWT_SECRET=\"$(openssl rand -hex 32)\"\n\
                 ===================================================================\n"
            );
        } else {
            eprintln!(
                "WARNING: no JWT secret configured; all bearer tokens will be treated as anonymous."
            );
        }
    } else if let Some(secret) = &config.auth.jwt_secret {
        if secret.len() < 16 {
            eprintln!(
                "WARNING: JWT secret is very short ({} chars). Recommended: at least 32.",
                secret.len()
            );
        }
    }

    if config.auth.jwt_algorithm != "HS256" {
        anyhow::bail!(
            "unsupported auth.jwt_algorithm {:?}; only \"HS256\" is implemented",
            config.auth.jwt_algorithm
        );
    }

    if config.live_war.map_width == 0 || config.live_war.map_height == 0 {
        anyhow::bail!("live_war.map_width and live_war.map_height must both be non-zero");
    }

    if config.live_war.tick_millis == 0 {
        anyhow::bail!("live_war.tick_millis must be non-zero");
    }

    if config.security.max_message_size == 0 {
        anyhow::bail!("security.max_message_size must be non-zero");
    }

    Ok(())
}

/// Detect if we're running in production mode.
///
/// Checks for `ROOMFORGE_PRODUCTION` or generic `PRODUCTION` / `PROD`
/// environment variables.
pub fn is_production_mode() -> bool {
    use std::env;

    if let Ok(mode) = env::var("ROOMFORGE__ENVIRONMENT") {
        return mode.eq_ignore_ascii_case("production") || mode.eq_ignore_ascii_case("prod");
    }

    env::var("ROOMFORGE_PRODUCTION").is_ok()
        || env::var("PRODUCTION").is_ok()
        || env::var("PROD").is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_passes_validation_outside_production() {
        let config = Config::default();
        assert!(validate_config_security(&config).is_ok());
    }

    #[test]
    fn zero_map_dimensions_are_rejected() {
        let mut config = Config::default();
        config.live_war.map_width = 0;
        assert!(validate_config_security(&config).is_err());
    }

    #[test]
    fn unsupported_algorithm_is_rejected() {
        let mut config = Config::default();
        config.auth.jwt_algorithm = "RS256".to_string();
        assert!(validate_config_security(&config).is_err());
    }
}
