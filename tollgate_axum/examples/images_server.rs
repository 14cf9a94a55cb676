use std::{env, time::Duration};

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tollgate_axum::permission_guards;
use tollgate_oauth2::{AuthConfig, Authority, Claims, ClientId};
use tracing_subscriber::EnvFilter;

permission_guards! {
    permission GetImages = "get:images";
    permission PostImages = "post:images";
    permission Authenticated = *;
}

const CALLBACK_URL: &str = "http://localhost:8080/login-results";
const HEADERS_URL: &str = "http://localhost:8080/headers";

#[derive(Clone)]
struct AppState {
    authority: Authority,
    config: AuthConfig,
    client_id: ClientId,
}

impl axum::extract::FromRef<AppState> for Authority {
    fn from_ref(state: &AppState) -> Self {
        state.authority.clone()
    }
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tollgate_oauth2=debug")),
        )
        .init();

    let domain = env::var("TOLLGATE_DOMAIN")?;
    let audience = env::var("TOLLGATE_AUDIENCE").unwrap_or_else(|_| "image".to_owned());
    let client_id = ClientId::from(env::var("TOLLGATE_CLIENT_ID")?);

    let config = AuthConfig::new(domain, audience);
    let authority = Authority::from_config(&config)?;
    authority
        .key_set_fetcher()
        .spawn_refresh(Duration::from_secs(600));

    let state = AppState {
        authority,
        config,
        client_id,
    };

    let app = Router::new()
        .route("/", get(index))
        .route("/login", get(login))
        .route("/login-results", get(login_results))
        .route("/headers", get(headers))
        .route("/images", get(list_images).post(upload_image))
        .fallback(not_found)
        .with_state(state);

    println!("Open http://localhost:8080/ to log in and receive a token");
    println!("Press Ctrl+C to exit");

    let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn redirect_to_login(state: &AppState, redirect_uri: &str) -> Response {
    match state.config.authorize_url(&state.client_id, redirect_uri) {
        Ok(url) => Redirect::to(url.as_str()).into_response(),
        Err(err) => {
            let error: &dyn std::error::Error = &err;
            tracing::error!(error, "unable to build the login URL");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn index(State(state): State<AppState>) -> Response {
    redirect_to_login(&state, CALLBACK_URL)
}

async fn login(State(state): State<AppState>) -> Response {
    redirect_to_login(&state, HEADERS_URL)
}

#[derive(Deserialize)]
struct LoginResults {
    access_token: Option<String>,
}

async fn login_results(Query(results): Query<LoginResults>) -> String {
    match results.access_token {
        Some(token) => format!("access token is {token}"),
        None => "no access token; the token is returned in the URL fragment".to_owned(),
    }
}

async fn headers(Authenticated(claims): Authenticated) -> String {
    format!("authenticated as {}", claims.subject())
}

async fn list_images(GetImages(claims): GetImages) -> Json<Claims> {
    tracing::info!(sub = %claims.subject(), "listing images");
    Json(claims)
}

async fn upload_image(_: PostImages) -> (StatusCode, &'static str) {
    (StatusCode::NOT_IMPLEMENTED, "not implemented")
}

async fn not_found() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "success": false,
            "error": 404,
            "message": "resource not found",
        })),
    )
}
