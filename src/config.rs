#[derive(clap::ValueEnum, Clone, Debug, Copy)]
pub enum CargoEnv {
    Development,
    Production,
}

#[derive(clap::Parser, Clone, Debug)]
pub struct AppConfig {
    // production or development
    #[clap(long, env, value_enum)]
    pub cargo_env: CargoEnv,

    // port that the app will bind to
    #[clap(long, env, default_value = "5000")]
    pub port: u16,

    // redis is optional, without it everything lives in process memory and health reports
    // degraded
    #[clap(long, env)]
    pub redis_url: Option<String>,

    // signs relay links, generate with 'openssl rand -base64 32'
    #[clap(long, env)]
    pub access_token_secret: String,

    // either * or a comma separated list of origins like example.com,something.com
    // only applies to the json api, the relay always answers with a wildcard
    #[clap(long, env)]
    pub cors_origin: String,

    // same as above but for preview deployments
    #[clap(long, env)]
    pub preview_cors_origin: String,

    // optional sentry integration
    #[clap(long, env)]
    pub sentry_dsn: Option<String>,

    // referer sent upstream by the passthrough profile when the client didn't send one
    #[clap(long, env, default_value = "https://example.com")]
    pub relay_default_referer: String,

    // connect timeout for upstream streams, the body itself is never timed out
    #[clap(long, env, default_value = "10")]
    pub relay_connect_timeout_secs: u64,

    // refuse relay requests that don't carry a valid signature
    #[clap(long, env)]
    pub require_signed_relay: bool,

    // refuse relay targets that resolve to loopback, link-local or private addresses
    #[clap(long, env)]
    pub relay_block_private_networks: bool,
}

impl AppConfig {
    /// all configured api origins, None when any origin is allowed
    pub fn allowed_origins(&self) -> Option<Vec<String>> {
        let mut origins = Vec::new();

        for value in [&self.cors_origin, &self.preview_cors_origin] {
            for origin in value.split(',').map(str::trim).filter(|o| !o.is_empty()) {
                if origin == "*" {
                    return None;
                }
                origins.push(origin.to_string());
            }
        }

        Some(origins)
    }
}

impl Default for AppConfig {
    // used by tests and as a local fallback, production always goes through clap
    fn default() -> Self {
        Self {
            cargo_env: CargoEnv::Development,
            port: 5000,
            redis_url: None,
            access_token_secret: "default-access-secret".to_string(),
            cors_origin: "*".to_string(),
            preview_cors_origin: "*".to_string(),
            sentry_dsn: None,
            relay_default_referer: "https://example.com".to_string(),
            relay_connect_timeout_secs: 10,
            require_signed_relay: false,
            relay_block_private_networks: false,
        }
    }
}
