/*
 * Responsibility
 * - HTML form など PUT/DELETE を送れない client 向けの HTTP method override
 * - field が `X-` で始まる場合は header、それ以外は parsed body field → query parameter の順に読む
 * - routing より前に実行する必要があるため、Router 全体を包む (builder 側で fallback_service に載せる)
 */
use std::sync::Arc;

use axum::Router;
use axum::extract::{Request, State};
use axum::http::Method;
use axum::middleware::{self, Next};
use axum::response::Response;
use tower::Layer;

use crate::middleware::body::ParsedBody;

pub const DEFAULT_METHOD_FIELD: &str = "X-HTTP-Method-Override";

const OVERRIDABLE_TO: [Method; 7] = [
    Method::GET,
    Method::HEAD,
    Method::POST,
    Method::PUT,
    Method::PATCH,
    Method::DELETE,
    Method::OPTIONS,
];

/// Method seen on the wire before any override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginalMethod(pub Method);

#[derive(Debug, Clone)]
pub struct MethodOverride {
    /// Header name (`X-...`) or body/query field name.
    pub field: String,
    /// Only requests using one of these methods may be overridden.
    pub methods: Vec<Method>,
}

impl Default for MethodOverride {
    fn default() -> Self {
        Self::new(DEFAULT_METHOD_FIELD)
    }
}

impl MethodOverride {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            methods: vec![Method::POST],
        }
    }

    fn is_header(&self) -> bool {
        self.field
            .get(..2)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("x-"))
    }

    fn requested_method(&self, req: &Request) -> Option<String> {
        if self.is_header() {
            return req
                .headers()
                .get(self.field.as_str())
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
        }

        if let Some(value) = req
            .extensions()
            .get::<ParsedBody>()
            .and_then(|body| body.field(&self.field))
        {
            return Some(value.to_string());
        }

        let query = req.uri().query()?;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(k, _)| k == self.field.as_str())
            .map(|(_, v)| v.into_owned())
    }
}

/// Wrap a complete Router so the override happens before its routing.
pub fn wrap(router: Router, options: MethodOverride) -> Router {
    let inner = middleware::from_fn_with_state(Arc::new(options), override_method).layer(router);
    Router::new().fallback_service(inner)
}

async fn override_method(
    State(options): State<Arc<MethodOverride>>,
    mut req: Request,
    next: Next,
) -> Response {
    let original = req.method().clone();

    if options.methods.contains(&original) {
        if let Some(requested) = options.requested_method(&req) {
            let upper = requested.trim().to_ascii_uppercase();
            match Method::from_bytes(upper.as_bytes()) {
                Ok(method) if OVERRIDABLE_TO.contains(&method) => {
                    tracing::debug!(from = %original, to = %method, "method override");
                    *req.method_mut() = method;
                }
                _ => tracing::debug!(requested = %requested, "ignoring method override"),
            }
        }
    }

    req.extensions_mut().insert(OriginalMethod(original));
    next.run(req).await
}
