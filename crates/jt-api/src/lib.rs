use std::env;
use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::connect_info::ConnectInfo,
    extract::DefaultBodyLimit,
    extract::State,
    http::header::{HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    http::Method,
    http::Request,
    middleware,
    middleware::Next,
    response::Response,
    routing::{delete, get, post, put},
    Router,
};
use chrono::Utc;
use clap::{Parser, ValueEnum};
use dotenvy::dotenv;
use governor::{
    clock::DefaultClock, middleware::NoOpMiddleware, state::keyed::DashMapStateStore, Quota,
    RateLimiter,
};
use jt_common::db::{create_pool_from_url_checked, run_migrations, MemoryStore, Stores};
use jt_common::logging::{init_tracing_subscriber, install_tracing_panic_hook};
use jt_common::seed::{seed_defaults, seed_roles};
use jt_common::{RoleName, SavedJobWorkflow};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

pub mod auth;
pub mod error;
pub mod handlers;

use auth::{AuthConfig, JwtAlgorithm};
use error::ApiError;
use handlers::{health, jobs, saved};

const SHUTDOWN_DRAIN_GRACE: Duration = Duration::from_millis(200);
const BODY_LIMIT_BYTES: usize = 256 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    Memory,
}

impl StorageBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageBackend::Postgres => "postgres",
            StorageBackend::Memory => "memory",
        }
    }
}

#[derive(Debug, Clone, Parser)]
#[command(name = "jt-api", about = "Job tracking API: catalog and per-user saved jobs")]
struct Cli {
    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Server port
    #[arg(long, env = "PORT", default_value_t = 3001)]
    port: u16,

    /// Storage backend: postgres | memory
    #[arg(long, env = "JT_STORAGE", default_value = "postgres", value_enum)]
    storage: StorageBackend,

    /// Secret for HMAC-signed tokens
    #[arg(long, env = "JWT_SECRET")]
    jwt_secret: Option<String>,

    /// PEM public key for RS256/ES256 tokens
    #[arg(long, env = "JWT_PUBLIC_KEY")]
    jwt_public_key: Option<String>,

    #[arg(long, env = "JWT_ALGORITHM", default_value = "hs512", value_enum)]
    jwt_algorithm: JwtAlgorithm,

    /// Comma separated list of allowed CORS origins
    #[arg(long, env = "JT_CORS_ORIGINS", default_value = "http://localhost:3000")]
    cors_origins: String,

    /// Create the sample catalog when the job table is empty
    #[arg(
        long,
        env = "JT_SEED_SAMPLE_DATA",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    seed_sample_data: bool,

    /// Users created in the memory backend at startup: `name[:ROLE|ROLE],...`
    #[arg(long, env = "JT_MEMORY_USERS", default_value = "")]
    memory_users: String,
}

/// An account provisioned into the memory backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryUser {
    pub username: String,
    pub roles: Vec<RoleName>,
}

/// Parse `alice,bob:USER|ADMIN`. A user without roles gets `ROLE_USER`.
fn parse_memory_users(raw: &str) -> Result<Vec<MemoryUser>, ApiError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (username, roles) = entry.split_once(':').unwrap_or((entry, ""));
            let username = username.trim();
            if username.is_empty() {
                return Err(ApiError::BadRequest(format!(
                    "JT_MEMORY_USERS entry {entry:?} has no username"
                )));
            }
            let mut parsed = roles
                .split('|')
                .map(str::trim)
                .filter(|role| !role.is_empty())
                .map(|role| {
                    RoleName::from_claim(role).ok_or_else(|| {
                        ApiError::BadRequest(format!("JT_MEMORY_USERS has unknown role {role:?}"))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            if parsed.is_empty() {
                parsed.push(RoleName::User);
            }
            Ok(MemoryUser {
                username: username.to_string(),
                roles: parsed,
            })
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub port: u16,
    pub storage: StorageBackend,
    pub cors_origins: Vec<String>,
    pub auth: AuthConfig,
    pub seed_sample_data: bool,
    pub memory_users: Vec<MemoryUser>,
}

impl AppConfig {
    fn from_cli(cli: Cli) -> Result<Self, ApiError> {
        let cors_origins = cli
            .cors_origins
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect::<Vec<_>>();

        if cors_origins.iter().any(|origin| origin == "*") {
            return Err(ApiError::BadRequest(
                "JT_CORS_ORIGINS must list explicit origins when credentials are enabled".into(),
            ));
        }

        let database_url = cli.database_url.filter(|url| !url.trim().is_empty());
        if cli.storage == StorageBackend::Postgres && database_url.is_none() {
            return Err(ApiError::BadRequest(
                "DATABASE_URL is required when JT_STORAGE=postgres".into(),
            ));
        }

        let non_blank = |value: Option<String>| value.filter(|v| !v.trim().is_empty());
        let auth = AuthConfig::new(
            non_blank(cli.jwt_secret).as_deref(),
            non_blank(cli.jwt_public_key).as_deref(),
            cli.jwt_algorithm,
        )?;

        let memory_users = parse_memory_users(&cli.memory_users)?;
        if cli.storage == StorageBackend::Postgres && !memory_users.is_empty() {
            warn!("JT_MEMORY_USERS is ignored with JT_STORAGE=postgres");
        }

        Ok(Self {
            database_url,
            port: cli.port,
            storage: cli.storage,
            cors_origins,
            auth,
            seed_sample_data: cli.seed_sample_data,
            memory_users,
        })
    }

    pub fn for_tests(auth: AuthConfig) -> Self {
        Self {
            database_url: None,
            port: 3001,
            storage: StorageBackend::Memory,
            cors_origins: vec!["http://localhost:3000".into()],
            auth,
            seed_sample_data: false,
            memory_users: Vec::new(),
        }
    }
}

type IpRateLimiter = RateLimiter<IpAddr, DashMapStateStore<IpAddr>, DefaultClock, NoOpMiddleware>;

#[derive(Clone)]
pub struct RateLimits {
    global: Arc<IpRateLimiter>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub global_per_sec: u64,
    pub global_burst: u32,
}

impl RateLimitConfig {
    fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let positive = |name: &str| {
            lookup(name)
                .and_then(|value| value.trim().parse::<u64>().ok())
                .filter(|value| *value > 0)
        };

        Self {
            global_per_sec: positive("JT_RATE_LIMIT_GLOBAL_PER_SEC").unwrap_or(20),
            global_burst: positive("JT_RATE_LIMIT_GLOBAL_BURST")
                .and_then(|value| u32::try_from(value).ok())
                .unwrap_or(40),
        }
    }
}

fn build_ip_limiter(per_second: u64, burst_size: u32) -> Arc<IpRateLimiter> {
    let nanos_per_token = 1_000_000_000u64 / per_second.max(1);
    let burst = NonZeroU32::new(burst_size).unwrap_or(NonZeroU32::MIN);
    let quota = Quota::with_period(Duration::from_nanos(nanos_per_token.max(1)))
        .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
        .allow_burst(burst);

    Arc::new(RateLimiter::keyed(quota))
}

pub fn default_rate_limits() -> RateLimits {
    let cfg = RateLimitConfig::from_env();
    RateLimits {
        global: build_ip_limiter(cfg.global_per_sec, cfg.global_burst),
    }
}

#[derive(Clone)]
pub struct AppState {
    pub stores: Stores,
    pub workflow: Arc<SavedJobWorkflow>,
    pub config: AppConfig,
    pub(crate) rate_limits: RateLimits,
    pub readiness: Arc<AtomicBool>,
}

pub type SharedState = Arc<AppState>;

impl axum::extract::FromRef<SharedState> for AuthConfig {
    fn from_ref(input: &SharedState) -> AuthConfig {
        input.config.auth.clone()
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed = origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(true)
}

fn request_ip<B>(req: &Request<B>) -> Option<IpAddr> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip())
}

fn enforce_rate_limit(limiter: &IpRateLimiter, ip: Option<IpAddr>) -> Result<(), ApiError> {
    if let Some(client_ip) = ip {
        if limiter.check_key(&client_ip).is_err() {
            return Err(ApiError::TooManyRequests(format!("rate limit exceeded for {client_ip}")));
        }
    }

    Ok(())
}

async fn global_rate_limit(
    State(state): State<SharedState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    enforce_rate_limit(&state.rate_limits.global, request_ip(&req))?;
    Ok(next.run(req).await)
}

async fn attach_request_id_context(req: Request<Body>, next: Next) -> Response {
    let request_id = req
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string());

    error::with_request_id(request_id, next.run(req)).await
}

pub fn create_router(state: SharedState) -> Router {
    let cors = cors_layer(&state.config.cors_origins);

    let request_id_header = HeaderName::from_static("x-request-id");
    let trace_header = request_id_header.clone();

    let trace = TraceLayer::new_for_http().make_span_with(move |request: &Request<Body>| {
        let request_id = request
            .headers()
            .get(&trace_header)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("");

        tracing::info_span!(
            "http_request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
            status = tracing::field::Empty,
        )
    });

    let api_routes = Router::new()
        .route("/jobs", get(jobs::list_jobs))
        .route("/jobs/save", post(saved::save_job))
        .route("/jobs/saved", get(saved::list_saved))
        .route("/jobs/saved/applied", get(saved::list_applied))
        .route("/jobs/saved/:id/apply", put(saved::mark_applied))
        .route("/jobs/saved/:id", delete(saved::delete_saved))
        .route("/jobs/source/:source", get(jobs::list_by_source))
        .route("/jobs/:id", get(jobs::get_job));

    Router::new()
        .route("/health", get(health::readyz))
        .route("/livez", get(health::livez))
        .route("/readyz", get(health::readyz))
        .nest("/api", api_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            global_rate_limit,
        ))
        .layer(middleware::from_fn(attach_request_id_context))
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(trace)
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(SetRequestIdLayer::new(
            request_id_header,
            MakeRequestUuid,
        ))
        .layer(cors)
        .with_state(state)
}

fn build_state(config: AppConfig, stores: Stores) -> SharedState {
    let workflow = Arc::new(SavedJobWorkflow::from_stores(&stores));
    Arc::new(AppState {
        stores,
        workflow,
        config,
        rate_limits: default_rate_limits(),
        readiness: Arc::new(AtomicBool::new(true)),
    })
}

/// In-memory state whose tokens are HS256-signed with `jwt_secret`.
pub fn test_state(jwt_secret: &str, store: Arc<MemoryStore>) -> SharedState {
    let auth = AuthConfig::hmac(jwt_secret, JwtAlgorithm::Hs256);
    build_state(AppConfig::for_tests(auth), Stores::memory(store))
}

async fn open_stores(config: &AppConfig) -> Result<Stores, ApiError> {
    match config.storage {
        StorageBackend::Memory => {
            warn!("using in-memory storage; data is lost on restart");
            let store = Arc::new(MemoryStore::new());
            for user in &config.memory_users {
                let created = store.add_user(&user.username, &user.roles).await;
                info!(user_id = created.id, username = %created.username, "provisioned memory user");
            }
            if config.memory_users.is_empty() {
                warn!("no JT_MEMORY_USERS configured; every token will resolve to an unknown user");
            }
            Ok(Stores::memory(store))
        }
        StorageBackend::Postgres => {
            let url = config.database_url.as_deref().ok_or_else(|| {
                ApiError::BadRequest("DATABASE_URL is required when JT_STORAGE=postgres".into())
            })?;
            let pool = create_pool_from_url_checked(url)
                .await
                .map_err(|err| ApiError::Database(format!("failed to create pool: {err}")))?;
            run_migrations(&pool)
                .await
                .map_err(|err| ApiError::Database(format!("failed to run migrations: {err}")))?;
            Ok(Stores::postgres(pool))
        }
    }
}

pub async fn run() -> Result<(), ApiError> {
    dotenv().ok();
    init_tracing_subscriber(env!("CARGO_PKG_NAME"));
    install_tracing_panic_hook(env!("CARGO_PKG_NAME"));

    let cli = Cli::parse();
    let config = AppConfig::from_cli(cli)?;
    let stores = open_stores(&config).await?;

    if config.seed_sample_data {
        let report = seed_defaults(&stores, Utc::now()).await?;
        info!(
            roles_created = report.roles_created.len(),
            sample_jobs_created = report.sample_jobs_created,
            "bootstrap seeding finished"
        );
    } else {
        seed_roles(&stores).await?;
    }

    let state = build_state(config.clone(), stores);
    let addr: SocketAddr = ([0, 0, 0, 0], config.port).into();
    let app = create_router(state.clone());

    info!(%addr, storage = config.storage.as_str(), jwt_algorithm = ?config.auth.jwt_algorithm, "jt-api listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;

    let service = app.into_make_service_with_connect_info::<SocketAddr>();

    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal(state.clone()))
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;

    Ok(())
}

async fn shutdown_signal(state: SharedState) {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
            let _ = sigterm.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown requested; marking not ready");
    state.readiness.store(false, Ordering::SeqCst);

    // Load balancers need a moment to see /readyz fail before new
    // connections stop being accepted.
    tokio::time::sleep(SHUTDOWN_DRAIN_GRACE).await;
}
