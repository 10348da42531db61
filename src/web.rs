//! Axum HTTP surface of the cookie gateway
//!
//! JSON endpoints for the sync process plus two small HTML pages where an
//! operator can bank cookies by hand. OpenAPI docs are served under `/docs`
//! when the `openapi` feature is enabled.

pub mod pages;

use crate::config::GatewayConfig;
use crate::cookies::Credential;
use crate::gateway::{CookieGateway, GatewayResponse, LoginRequest, ManualCookieStore};
use axum::response::{Html, Redirect};
use axum::{
    Form, Json, Router,
    extract::State,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub const SERVICE_NAME: &str = "psegli-automation";

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<CookieGateway>,
    /// Portal root shown on the manual cookie page
    pub portal_url: String,
    /// One browser login at a time
    pub login_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(gateway: Arc<CookieGateway>, portal_url: &str) -> Self {
        Self {
            gateway,
            portal_url: portal_url.to_string(),
            login_lock: Arc::new(Mutex::new(())),
        }
    }

    fn manual(&self) -> &ManualCookieStore {
        self.gateway.manual()
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

#[derive(Debug, Deserialize)]
pub struct CookieForm {
    pub cookies: String,
}

const DOCS_PATH: Option<&str> = if cfg!(feature = "openapi") {
    Some("/docs")
} else {
    None
};

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/health", responses(
    (status = 200, description = "Gateway is up", body = HealthResponse)
)))]
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: SERVICE_NAME.to_string(),
        version: env!("APP_VERSION").to_string(),
    })
}

async fn run_login(state: &AppState, request: LoginRequest) -> GatewayResponse {
    let credential = Credential::new(request.username, request.password);
    if !credential.is_complete() {
        return GatewayResponse::failure("username and password are required");
    }
    let logger = crate::logging::get_logger("web");
    logger.info(&format!("Login request for {}", credential.username));

    let _guard = state.login_lock.lock().await;
    let outcome = state.gateway.acquire(&credential).await;
    if outcome.cookies().is_none() {
        logger.warn("Login failed, no cookies returned");
    }
    GatewayResponse::from_outcome(&outcome)
}

#[cfg_attr(feature = "openapi", utoipa::path(post, path = "/login", request_body = LoginRequest, responses(
    (status = 200, description = "Login outcome", body = GatewayResponse)
)))]
pub async fn login(State(state): State<AppState>, Json(body): Json<LoginRequest>) -> impl IntoResponse {
    Json(run_login(&state, body).await)
}

#[cfg_attr(feature = "openapi", utoipa::path(post, path = "/login-form", responses(
    (status = 200, description = "Login outcome", body = GatewayResponse)
)))]
pub async fn login_form(State(state): State<AppState>, Form(body): Form<LoginRequest>) -> impl IntoResponse {
    Json(run_login(&state, body).await)
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/cookies", responses(
    (status = 200, description = "Manual cookie page", body = String, content_type = "text/html")
)))]
pub async fn cookies_page(State(state): State<AppState>) -> impl IntoResponse {
    let saved = state.manual().load();
    Html(pages::cookie_form(saved.as_ref(), &state.portal_url, DOCS_PATH))
}

#[cfg_attr(feature = "openapi", utoipa::path(post, path = "/cookies", responses(
    (status = 200, description = "Save result page", body = String, content_type = "text/html")
)))]
pub async fn save_cookies(State(state): State<AppState>, Form(form): Form<CookieForm>) -> impl IntoResponse {
    match state.manual().save(&form.cookies) {
        Ok(_) => Html(pages::saved_page()),
        Err(e) => {
            crate::logging::get_logger("web").error(&format!("Failed to save cookies: {}", e));
            Html(pages::save_failed_page(&e.to_string()))
        }
    }
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/cookies/get", responses(
    (status = 200, description = "Banked cookies", body = GatewayResponse)
)))]
pub async fn saved_cookies(State(state): State<AppState>) -> impl IntoResponse {
    match state.manual().load() {
        Some(saved) => Json(GatewayResponse {
            success: true,
            cookies: Some(saved.cookies),
            ..GatewayResponse::default()
        }),
        None => Json(GatewayResponse::failure(
            "No cookies saved. Visit /cookies to add them.",
        )),
    }
}

#[cfg(feature = "openapi")]
#[derive(utoipa::OpenApi)]
#[openapi(
    paths(health, login, login_form, cookies_page, save_cookies, saved_cookies),
    components(schemas(HealthResponse, LoginRequest, GatewayResponse)),
    tags((name = "psegli", description = "PSEG cookie gateway"))
)]
pub struct ApiDoc;

pub fn build_router(state: AppState) -> Router {
    let router = Router::new()
        .route(
            "/",
            get(|| async { Redirect::to(DOCS_PATH.unwrap_or("/cookies")) }),
        )
        .route("/health", get(health))
        .route("/login", post(login))
        .route("/login-form", post(login_form))
        .route("/cookies", get(cookies_page).post(save_cookies))
        .route("/cookies/get", get(saved_cookies));

    #[cfg(feature = "openapi")]
    let router = {
        use utoipa::OpenApi;
        router.merge(utoipa_swagger_ui::SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
    };

    router
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

fn bind_address(host: &str, port: u16) -> (SocketAddr, bool) {
    match host.parse::<IpAddr>() {
        Ok(ip) => (SocketAddr::new(ip, port), true),
        Err(_) => (([127, 0, 0, 1], port).into(), false),
    }
}

pub async fn serve(config: &GatewayConfig, portal_url: &str) -> anyhow::Result<()> {
    let gateway = Arc::new(CookieGateway::from_config(config)?);
    let router = build_router(AppState::new(gateway, portal_url));

    let logger = crate::logging::get_logger("web");
    logger.info(&format!(
        "Starting gateway v{}; requested host={}, port={}",
        env!("APP_VERSION"),
        config.host,
        config.port
    ));

    let (addr, parsed_ok) = bind_address(&config.host, config.port);
    if !parsed_ok {
        logger.warn(&format!("Invalid host '{}'; falling back to 127.0.0.1", config.host));
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    logger.info(&format!(
        "Gateway listening at http://{}:{} (manual cookies at /cookies)",
        local_addr.ip(),
        local_addr.port()
    ));

    axum::serve(listener, router).await?;
    Ok(())
}
