//! HTTPS enforcement.
//!
//! A request counts as secure when its URI scheme is `https`, or when `trust_proxy` is set and
//! the `X-Forwarded-Proto` header says `https` (TLS terminated at a load balancer).

use std::sync::Arc;

use axum::Router;
use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};

use crate::error::AppError;

const X_FORWARDED_PROTO: &str = "x-forwarded-proto";

/// What to do with a plain-HTTP request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InsecureAction {
    #[default]
    Reject,
    Redirect,
}

#[derive(Debug, Clone, Default)]
pub struct EnforceSslOptions {
    pub disabled: bool,
    pub trust_proxy: bool,
    pub action: InsecureAction,
}

/// Apply HTTPS enforcement to the given Router.
pub fn apply(router: Router, options: EnforceSslOptions) -> Router {
    if options.disabled {
        tracing::debug!("ssl enforcement disabled");
        return router;
    }
    router.layer(middleware::from_fn_with_state(Arc::new(options), enforce_ssl))
}

fn is_secure(req: &Request, trust_proxy: bool) -> bool {
    let scheme_is_https = req
        .uri()
        .scheme_str()
        .is_some_and(|s| s.eq_ignore_ascii_case("https"));

    scheme_is_https
        || (trust_proxy
            && req
                .headers()
                .get(X_FORWARDED_PROTO)
                .and_then(|v| v.to_str().ok())
                // first hop wins when proxies append
                .and_then(|v| v.split(',').next())
                .is_some_and(|v| v.trim().eq_ignore_ascii_case("https")))
}

fn https_location(req: &Request) -> Option<HeaderValue> {
    let host = req
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| req.uri().host())?;
    let path = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    HeaderValue::from_str(&format!("https://{host}{path}")).ok()
}

async fn enforce_ssl(
    State(options): State<Arc<EnforceSslOptions>>,
    req: Request,
    next: Next,
) -> Response {
    if is_secure(&req, options.trust_proxy) {
        return next.run(req).await;
    }

    if options.action == InsecureAction::Redirect {
        if let Some(location) = https_location(&req) {
            return (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, location)]).into_response();
        }
        tracing::warn!(uri = %req.uri(), "cannot build https redirect without a host");
    }

    AppError::forbidden("Please use HTTPS when communicating with this server.").into_response()
}
