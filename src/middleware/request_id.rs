//! Request-Id tagging.
//!
//! Responsibility:
//! - Reuse an inbound request id (header first, then query parameter)
//! - Otherwise generate one (UUID v4)
//! - Make it available to later middleware/handlers (`RequestId` extension + request header)
//! - Expose it on the response

use axum::Router;
use axum::extract::{Request, State};
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::{self, Next};
use axum::response::Response;
use tower::ServiceBuilder;
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use uuid::Uuid;

pub const DEFAULT_REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, Clone)]
pub struct RequestIdOptions {
    /// Response header carrying the id. `None` keeps it internal.
    pub expose: Option<HeaderName>,
    /// Request header checked for an inbound id.
    pub header: HeaderName,
    /// Query parameter checked for an inbound id.
    pub query: Option<String>,
}

impl Default for RequestIdOptions {
    fn default() -> Self {
        let name = HeaderName::from_static(DEFAULT_REQUEST_ID_HEADER);
        Self {
            expose: Some(name.clone()),
            header: name,
            query: Some(DEFAULT_REQUEST_ID_HEADER.to_string()),
        }
    }
}

/// Query parameter if present, UUID v4 otherwise.
///
/// Only consulted by `SetRequestIdLayer` when the request header is missing.
#[derive(Debug, Clone, Default)]
pub struct MakeRequestIdFromQuery {
    query: Option<String>,
}

impl MakeRequestIdFromQuery {
    pub fn new(query: Option<String>) -> Self {
        Self { query }
    }

    fn from_query<B>(&self, request: &axum::http::Request<B>) -> Option<HeaderValue> {
        let key = self.query.as_deref()?;
        let query = request.uri().query()?;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(k, v)| k == key && !v.is_empty())
            .and_then(|(_, v)| HeaderValue::from_str(&v).ok())
    }
}

impl MakeRequestId for MakeRequestIdFromQuery {
    fn make_request_id<B>(&mut self, request: &axum::http::Request<B>) -> Option<RequestId> {
        let value = match self.from_query(request) {
            Some(value) => value,
            None => HeaderValue::from_str(&Uuid::new_v4().to_string()).ok()?,
        };
        Some(RequestId::new(value))
    }
}

/// Apply request-id middleware to the given Router.
pub fn apply(router: Router, options: RequestIdOptions) -> Router {
    let set = SetRequestIdLayer::new(
        options.header.clone(),
        MakeRequestIdFromQuery::new(options.query),
    );

    match options.expose {
        // Same header in and out: tower-http already does the copy.
        Some(expose) if expose == options.header => router.layer(
            ServiceBuilder::new()
                .layer(set)
                .layer(PropagateRequestIdLayer::new(options.header)),
        ),
        Some(expose) => router.layer(
            ServiceBuilder::new()
                .layer(set)
                .layer(middleware::from_fn_with_state(expose, expose_request_id)),
        ),
        None => router.layer(set),
    }
}

async fn expose_request_id(
    State(expose): State<HeaderName>,
    req: Request,
    next: Next,
) -> Response {
    let id = req.extensions().get::<RequestId>().cloned();
    let mut response = next.run(req).await;
    if let Some(id) = id {
        response
            .headers_mut()
            .entry(expose)
            .or_insert_with(|| id.header_value().clone());
    }
    response
}
