//! Axum integration for the pull endpoints.
//!
//! Provides extractors for the pull protocol and a ready-made router.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use bloomin8_pull::{axum_ext, PullConfig, PullService};
//!
//! let service = PullService::new(PullConfig::load("bloomin8.yaml")?)?;
//! let app = axum_ext::router(Arc::new(service));
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, app).await?;
//! ```

use std::sync::Arc;

use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;

use crate::auth::AccessToken;
use crate::device::{PullRequest, PullResponse, SignalRequest, SignalResponse};
use crate::service::PullService;
use crate::store::HistoryStore;

/// Scheme and host the request was addressed to, e.g. `http://ha.local:8123`.
///
/// Image URLs handed to the device must be absolute. The scheme comes from
/// `X-Forwarded-Proto` when behind a proxy, the host from the `Host` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseUrl(pub String);

impl<S> FromRequestParts<S> for BaseUrl
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let headers = &parts.headers;

        let scheme = headers
            .get("X-Forwarded-Proto")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').next())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .or_else(|| parts.uri.scheme_str().map(|s| s.to_string()))
            .unwrap_or_else(|| "http".to_string());

        let host = headers
            .get(http::header::HOST)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
            .or_else(|| parts.uri.authority().map(|a| a.to_string()))
            .unwrap_or_else(|| "localhost".to_string());

        Ok(BaseUrl(format!("{}://{}", scheme, host)))
    }
}

/// Extract pull parameters from the query string.
impl<S> FromRequestParts<S> for PullRequest
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(PullRequest::from_query_string(parts.uri.query().unwrap_or("")))
    }
}

/// Extract signal parameters from the query string.
impl<S> FromRequestParts<S> for SignalRequest
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(SignalRequest::from_query_string(
            parts.uri.query().unwrap_or(""),
        ))
    }
}

/// Router with `GET /eink_pull` and `GET /eink_signal`.
pub fn router<H>(service: Arc<PullService<H>>) -> Router
where
    H: HistoryStore + 'static,
{
    Router::new()
        .route("/eink_pull", get(pull::<H>))
        .route("/eink_signal", get(signal::<H>))
        .with_state(service)
}

/// GET /eink_pull - choose an image and the next wake time.
///
/// Note that HTTP 204 responses carry no body on the wire; the device only
/// sees the status code in the "no image" case.
pub async fn pull<H>(
    State(service): State<Arc<PullService<H>>>,
    token: AccessToken,
    BaseUrl(base_url): BaseUrl,
    request: PullRequest,
) -> (StatusCode, Json<PullResponse>)
where
    H: HistoryStore + 'static,
{
    if let Err(e) = service.authorize(&token) {
        tracing::warn!("Rejected eink_pull: {}", e);
        return respond(PullResponse::unauthorized());
    }

    let response = tokio::task::spawn_blocking(move || {
        service.handle_pull(&request, &base_url, Utc::now())
    })
    .await
    .unwrap_or_else(|e| {
        tracing::error!("eink_pull task failed: {}", e);
        PullResponse::error(500, "Internal error")
    });

    respond(response)
}

/// GET /eink_signal - record whether the device displayed the image.
pub async fn signal<H>(
    State(service): State<Arc<PullService<H>>>,
    token: AccessToken,
    request: SignalRequest,
) -> (StatusCode, Json<SignalResponse>)
where
    H: HistoryStore + 'static,
{
    if let Err(e) = service.authorize(&token) {
        tracing::warn!("Rejected eink_signal: {}", e);
        return (StatusCode::UNAUTHORIZED, Json(SignalResponse::unauthorized()));
    }

    let response =
        tokio::task::spawn_blocking(move || service.handle_signal(&request, Utc::now()))
            .await
            .unwrap_or_else(|e| {
                tracing::error!("eink_signal task failed: {}", e);
                SignalResponse::error(500, "Internal error")
            });

    (status_code(response.status), Json(response))
}

fn respond(response: PullResponse) -> (StatusCode, Json<PullResponse>) {
    (status_code(response.status), Json(response))
}

fn status_code(status: u16) -> StatusCode {
    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}
