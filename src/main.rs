use std::{collections::HashMap, net::SocketAddr, sync::Arc};

use axum::{
    Router,
    routing::{get, post},
};
use clap::Parser;
use tower_http::trace::TraceLayer;

mod cache;
mod config;
mod oidc;
mod ratelimit;
mod routes;
mod saml;
mod store;

#[cfg(test)]
mod tests;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::BrokerConfig>,
    pub cache: Arc<dyn cache::Cache>,
    pub provider: Arc<oidc::OidcProvider>,
}

impl AppState {
    pub async fn new(config: config::BrokerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let cache = build_cache(&config.cache)?;
        seed_runtime_settings(&cache, &config).await?;

        let clients = config::ClientRegistry::from_file(&config.oidc.clients_file)?;
        let signer = oidc::TokenSigner::from_config(&config.oidc)?;
        let store = store::ContextStore::new(
            Arc::clone(&cache),
            store::ContextTtls::from_config(&config.oidc),
        );
        let rate_limiter = ratelimit::RateLimiter::new(Arc::clone(&cache), config.rate_limit.clone());

        let mut identity_providers = HashMap::new();
        for (name, provider_config) in &config.saml.identity_providers {
            let provider = saml::SamlIdentityProvider::from_config(name, provider_config)
                .map_err(|e| format!("failed to set up identity provider '{}': {}", name, e))?;
            identity_providers.insert(name.clone(), Arc::new(provider));
        }

        let provider = oidc::OidcProvider::new(
            config.oidc.clone(),
            clients,
            rate_limiter,
            store,
            signer,
            identity_providers,
        );

        Ok(Self {
            config: Arc::new(config),
            cache,
            provider: Arc::new(provider),
        })
    }
}

fn build_cache(
    config: &config::CacheConfig,
) -> Result<Arc<dyn cache::Cache>, Box<dyn std::error::Error>> {
    match config {
        config::CacheConfig::Memory(c) => Ok(Arc::new(cache::MemoryCache::new(c.max_entries))),
        #[cfg(feature = "redis")]
        config::CacheConfig::Redis(c) => Ok(Arc::new(cache::RedisCache::from_config(c)?)),
        #[cfg(not(feature = "redis"))]
        config::CacheConfig::Redis(_) => {
            Err("cache type is 'redis' but the redis feature is not compiled in".into())
        }
    }
}

/// The active identity provider and its capacity live in the cache so
/// operators can change them at runtime without a restart. On a fresh
/// cache the first configured login method becomes the primary provider;
/// existing values are left alone.
async fn seed_runtime_settings(
    cache: &Arc<dyn cache::Cache>,
    config: &config::BrokerConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let key = &config.rate_limit.primary_idp_key;
    if cache.get_string(key).await?.is_none() {
        let primary = &config.oidc.login_methods[0];
        cache
            .set_bytes(key, primary.as_bytes(), std::time::Duration::ZERO)
            .await?;
        tracing::info!(idp = %primary, "seeded primary identity provider");
    }
    Ok(())
}

pub fn build_app(state: AppState) -> Router {
    let mut app = Router::new()
        .route(
            "/.well-known/openid-configuration",
            get(routes::oidc::discovery),
        )
        .route("/jwks", get(routes::oidc::jwks))
        .route("/authorize", get(routes::oidc::authorize))
        .route("/token", post(routes::oidc::token))
        .route(
            "/userinfo",
            get(routes::oidc::userinfo).post(routes::oidc::userinfo),
        )
        .route("/acs", get(routes::saml::acs))
        .route("/health", get(routes::health::health_check))
        .route("/health/live", get(routes::health::liveness))
        .route("/health/ready", get(routes::health::readiness));

    // The mock IdP pages exist only when a provider actually uses the mock
    // binding, which config validation already rules out in production.
    let has_mock = state
        .config
        .saml
        .identity_providers
        .values()
        .any(|p| p.binding == config::AuthnBinding::Mock);
    if has_mock {
        app = app
            .route("/mock-idp", get(routes::saml::mock_idp))
            .route("/mock-idp/login", get(routes::saml::mock_idp_login));
    }

    app.layer(TraceLayer::new_for_http()).with_state(state)
}

#[derive(Parser, Debug)]
#[command(version, about = "OIDC provider brokering logins to an upstream SAML IdP", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to the config file
    #[arg(short, long, global = true, default_value = "eidbridge.toml")]
    config: String,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Start the broker (default)
    Serve,
    /// Validate the configuration file and exit
    Validate,
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    match args.command {
        Some(Command::Validate) => run_validate(&args.config),
        Some(Command::Serve) | None => run_server(&args.config).await,
    }
}

fn run_validate(config_path: &str) {
    match config::BrokerConfig::from_file(config_path) {
        Ok(config) => {
            // The clients file is loaded separately at startup; check it too.
            if let Err(e) = config::ClientRegistry::from_file(&config.oidc.clients_file) {
                eprintln!("Invalid clients file: {}", e);
                std::process::exit(1);
            }
            println!("Configuration OK: {}", config_path);
        }
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run_server(config_path: &str) {
    let config = match config::BrokerConfig::from_file(config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", config_path, e);
            std::process::exit(1);
        }
    };

    init_tracing();
    tracing::info!(config_file = %config_path, "Starting eidbridge");

    let state = match AppState::new(config).await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to start: {}", e);
            std::process::exit(1);
        }
    };

    let bind_addr = SocketAddr::new(state.config.server.host, state.config.server.port);
    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .expect("Failed to bind to address");
    tracing::info!("Server listening on http://{}", bind_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Server error");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
