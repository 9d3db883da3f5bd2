//! CORS policy for browser clients.
//!
//! Note:
//! - CORS is enforced by browsers. Native mobile apps and server-to-server calls are not
//!   restricted by CORS.
//! - When no allow-origin value is produced, the browser falls back to same-origin.
//!
//! Policy:
//! - `OriginPolicy::Wildcard`: `Access-Control-Allow-Origin: *` on every response.
//! - `OriginPolicy::Pattern`: echo the request origin when it matches the pattern, or when it
//!   is a local development origin (`.../localhost` with an optional port).
//!
//! Only `OPTIONS` carrying `Access-Control-Request-Method` is answered as a preflight. A bare
//! `OPTIONS` reaches the downstream handler; `tower_http` would short-circuit it, so it
//! bypasses the `CorsLayer` and gets the allow-origin headers added here.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::Response;
use regex::Regex;
use tower::{Layer, ServiceExt};
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};

pub const DEFAULT_ALLOW_METHODS: &str = "GET,HEAD,PUT,POST,DELETE,PATCH";

/// Which origins receive an `Access-Control-Allow-Origin` header.
///
/// Chosen once at configuration time, evaluated per request by [`OriginPolicy::resolve`].
#[derive(Debug, Clone)]
pub enum OriginPolicy {
    Wildcard,
    Pattern(Regex),
}

impl OriginPolicy {
    /// Compile a pattern policy.
    pub fn pattern(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(pattern).map(Self::Pattern)
    }

    /// Allow-origin value for the given request origin, if any.
    pub fn resolve<'a>(&self, origin: Option<&'a str>) -> Option<Cow<'a, str>> {
        match self {
            Self::Wildcard => Some(Cow::Borrowed("*")),
            Self::Pattern(pattern) => {
                let origin = origin?;
                if pattern.is_match(origin) || is_local_dev_origin(origin) {
                    Some(Cow::Borrowed(origin))
                } else {
                    None
                }
            }
        }
    }
}

/// `.../localhost` with an optional `:port` suffix.
fn is_local_dev_origin(origin: &str) -> bool {
    let host = match origin.rsplit_once(':') {
        Some((head, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => {
            head
        }
        _ => origin,
    };

    host.ends_with("/localhost")
}

#[derive(Debug, Clone)]
pub struct CorsOptions {
    pub allow_origin: OriginPolicy,
    /// Comma-separated method list, sent as `Access-Control-Allow-Methods` on preflight.
    pub allow_methods: String,
    pub expose_headers: Vec<HeaderName>,
    pub max_age: Option<Duration>,
}

impl Default for CorsOptions {
    fn default() -> Self {
        Self {
            allow_origin: OriginPolicy::Wildcard,
            allow_methods: DEFAULT_ALLOW_METHODS.to_string(),
            expose_headers: Vec::new(),
            max_age: None,
        }
    }
}

/// Build the `tower_http` CORS layer for the given options.
///
/// Preflight responses from this layer carry `200`; [`preflight_no_content`] rewrites them.
fn layer(options: &CorsOptions) -> CorsLayer {
    let allow_origin = match &options.allow_origin {
        OriginPolicy::Wildcard => AllowOrigin::any(),
        policy @ OriginPolicy::Pattern(_) => {
            let policy = policy.clone();
            AllowOrigin::predicate(move |origin: &HeaderValue, _req| {
                origin
                    .to_str()
                    .ok()
                    .and_then(|origin| policy.resolve(Some(origin)))
                    .is_some()
            })
        }
    };

    let mut cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(parse_methods(&options.allow_methods))
        .allow_headers(AllowHeaders::mirror_request())
        .vary([header::ORIGIN]);

    if !options.expose_headers.is_empty() {
        cors = cors.expose_headers(options.expose_headers.clone());
    }
    if let Some(max_age) = options.max_age {
        cors = cors.max_age(max_age);
    }

    cors
}

fn parse_methods(list: &str) -> Vec<Method> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| match Method::from_bytes(s.as_bytes()) {
            Ok(method) => Some(method),
            Err(_) => {
                tracing::warn!(method = %s, "ignoring invalid CORS method");
                None
            }
        })
        .collect()
}

fn is_preflight(req: &Request) -> bool {
    req.method() == Method::OPTIONS
        && req
            .headers()
            .contains_key(header::ACCESS_CONTROL_REQUEST_METHOD)
}

/// Answer preflight requests with `204 No Content`.
///
/// Must wrap the CORS layer (registered outside it).
async fn preflight_no_content(req: Request, next: Next) -> Response {
    let preflight = is_preflight(&req);
    let mut response = next.run(req).await;
    if preflight && response.status() == StatusCode::OK {
        *response.status_mut() = StatusCode::NO_CONTENT;
    }
    response
}

struct CorsDispatch {
    /// Same routes behind the `CorsLayer`.
    with_cors: Router,
    policy: OriginPolicy,
    expose_headers: Option<HeaderValue>,
}

impl CorsDispatch {
    /// Headers a simple (non-preflight) CORS response carries.
    fn decorate(&self, origin: Option<&str>, headers: &mut HeaderMap) {
        let allow_origin = self
            .policy
            .resolve(origin)
            .and_then(|value| HeaderValue::from_str(&value).ok());

        if let Some(allow_origin) = allow_origin {
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, allow_origin);
            if let Some(expose) = &self.expose_headers {
                headers.insert(header::ACCESS_CONTROL_EXPOSE_HEADERS, expose.clone());
            }
        }
        headers.append(header::VARY, HeaderValue::from_static("origin"));
    }
}

/// Wrap a Router with CORS support.
pub fn apply(router: Router, options: CorsOptions) -> Router {
    let with_cors = router
        .clone()
        .layer(layer(&options))
        .layer(middleware::from_fn(preflight_no_content));

    let expose_headers = (!options.expose_headers.is_empty())
        .then(|| {
            let names: Vec<&str> = options.expose_headers.iter().map(HeaderName::as_str).collect();
            HeaderValue::from_str(&names.join(",")).ok()
        })
        .flatten();

    let state = Arc::new(CorsDispatch {
        with_cors,
        policy: options.allow_origin,
        expose_headers,
    });
    let inner = middleware::from_fn_with_state(state, dispatch).layer(router);
    Router::new().fallback_service(inner)
}

async fn dispatch(State(cors): State<Arc<CorsDispatch>>, req: Request, next: Next) -> Response {
    if req.method() != Method::OPTIONS || is_preflight(&req) {
        return match cors.with_cors.clone().oneshot(req).await {
            Ok(response) => response,
            Err(never) => match never {},
        };
    }

    let origin = req
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let mut response = next.run(req).await;
    cors.decorate(origin.as_deref(), response.headers_mut());
    response
}
