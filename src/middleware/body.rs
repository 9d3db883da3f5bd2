//! Request body parsing.
//!
//! Responsibility:
//! - Buffer JSON / URL-encoded form / text bodies (bounded per type)
//! - Parse them into a `ParsedBody` request extension
//! - Put the buffered bytes back so extractors (`Json`, `Form`, ...) still work
//!
//! Other content types pass through untouched.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, header};
use axum::middleware::{self, Next};
use axum::response::Response;
use serde_json::Value;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyType {
    Json,
    Form,
    Text,
}

impl BodyType {
    fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let content_type = headers.get(header::CONTENT_TYPE)?.to_str().ok()?;
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            "application/json" | "application/csp-report" => Some(Self::Json),
            s if s.starts_with("application/") && s.ends_with("+json") => Some(Self::Json),
            "application/x-www-form-urlencoded" => Some(Self::Form),
            "text/plain" => Some(Self::Text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BodyParseOptions {
    pub enable_types: Vec<BodyType>,
    pub json_limit: usize,
    pub form_limit: usize,
    pub text_limit: usize,
    /// Only accept JSON objects and arrays.
    pub strict: bool,
}

impl Default for BodyParseOptions {
    fn default() -> Self {
        Self {
            enable_types: vec![BodyType::Json, BodyType::Form],
            json_limit: 1024 * 1024,
            form_limit: 56 * 1024,
            text_limit: 1024 * 1024,
            strict: true,
        }
    }
}

impl BodyParseOptions {
    fn limit_for(&self, body_type: BodyType) -> usize {
        match body_type {
            BodyType::Json => self.json_limit,
            BodyType::Form => self.form_limit,
            BodyType::Text => self.text_limit,
        }
    }
}

/// Parsed request body, stored in request extensions.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedBody {
    Json(Value),
    Form(Vec<(String, String)>),
    Text(String),
}

impl ParsedBody {
    /// Top-level string field (JSON object member or form pair).
    pub fn field(&self, name: &str) -> Option<&str> {
        match self {
            Self::Json(value) => value.get(name).and_then(Value::as_str),
            Self::Form(pairs) => pairs
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str()),
            Self::Text(_) => None,
        }
    }
}

/// Apply the body parser to the given Router.
pub fn apply(router: Router, options: BodyParseOptions) -> Router {
    router.layer(middleware::from_fn_with_state(Arc::new(options), parse_body))
}

async fn parse_body(
    State(options): State<Arc<BodyParseOptions>>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(body_type) =
        BodyType::from_headers(req.headers()).filter(|t| options.enable_types.contains(t))
    else {
        return Ok(next.run(req).await);
    };

    let limit = options.limit_for(body_type);
    let (parts, body) = req.into_parts();
    let bytes = axum::body::to_bytes(body, limit).await.map_err(|err| {
        tracing::debug!(error = %err, limit, "failed to buffer request body");
        AppError::PayloadTooLarge { limit }
    })?;

    let parsed = match body_type {
        BodyType::Json => ParsedBody::Json(parse_json(&bytes, options.strict)?),
        BodyType::Form => ParsedBody::Form(
            url::form_urlencoded::parse(&bytes)
                .into_owned()
                .collect(),
        ),
        BodyType::Text => ParsedBody::Text(
            String::from_utf8(bytes.to_vec())
                .map_err(|_| AppError::bad_request("INVALID_BODY", "body is not valid utf-8"))?,
        ),
    };

    let mut req = Request::from_parts(parts, Body::from(bytes));
    req.extensions_mut().insert(parsed);

    Ok(next.run(req).await)
}

fn parse_json(bytes: &[u8], strict: bool) -> Result<Value, AppError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Default::default()));
    }

    let value: Value = serde_json::from_slice(bytes)
        .map_err(|err| AppError::bad_request("INVALID_JSON", err.to_string()))?;

    if strict && !(value.is_object() || value.is_array()) {
        return Err(AppError::bad_request(
            "INVALID_JSON",
            "only objects and arrays are accepted",
        ));
    }

    Ok(value)
}

#[cfg(test)]
mod tests {
    use axum::http::{Request, StatusCode};
    use axum::routing::post;
    use axum::Json;
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;

    async fn echo(req: Request<Body>) -> Json<Value> {
        let parsed = req.extensions().get::<ParsedBody>().map(|p| match p {
            ParsedBody::Json(v) => json!({ "json": v }),
            ParsedBody::Form(pairs) => json!({ "form": pairs }),
            ParsedBody::Text(s) => json!({ "text": s }),
        });
        let bytes = axum::body::to_bytes(req.into_body(), usize::MAX)
            .await
            .expect("body should be readable");
        let raw = String::from_utf8_lossy(&bytes).into_owned();
        Json(json!({ "parsed": parsed, "raw": raw }))
    }

    fn app(options: BodyParseOptions) -> Router {
        apply(Router::new().route("/", post(echo)), options)
    }

    async fn send(router: Router, content_type: &str, body: &'static str) -> Response {
        router
            .oneshot(
                Request::post("/")
                    .header(header::CONTENT_TYPE, content_type)
                    .body(Body::from(body))
                    .expect("request should build"),
            )
            .await
            .expect("request should succeed")
    }

    async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should be readable");
        serde_json::from_slice(&bytes).expect("body should be json")
    }

    #[tokio::test]
    async fn parses_json_and_keeps_raw_body() {
        let response = send(
            app(BodyParseOptions::default()),
            "application/json; charset=utf-8",
            r#"{"name":"kit"}"#,
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["parsed"]["json"]["name"], "kit");
        assert_eq!(body["raw"], r#"{"name":"kit"}"#);
    }

    #[tokio::test]
    async fn parses_form() {
        let response = send(
            app(BodyParseOptions::default()),
            "application/x-www-form-urlencoded",
            "_method=DELETE&a=1",
        )
        .await;

        let body = json_body(response).await;
        assert_eq!(body["parsed"]["form"], json!([["_method", "DELETE"], ["a", "1"]]));
    }

    #[tokio::test]
    async fn text_is_ignored_unless_enabled() {
        let response = send(app(BodyParseOptions::default()), "text/plain", "hello").await;
        assert_eq!(json_body(response).await["parsed"], Value::Null);

        let options = BodyParseOptions {
            enable_types: vec![BodyType::Text],
            ..BodyParseOptions::default()
        };
        let response = send(app(options), "text/plain", "hello").await;
        assert_eq!(json_body(response).await["parsed"]["text"], "hello");
    }

    #[tokio::test]
    async fn rejects_malformed_json() {
        let response = send(app(BodyParseOptions::default()), "application/json", "{nope").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"]["code"], "INVALID_JSON");
    }

    #[tokio::test]
    async fn strict_mode_rejects_scalars() {
        let response = send(app(BodyParseOptions::default()), "application/json", "42").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let options = BodyParseOptions {
            strict: false,
            ..BodyParseOptions::default()
        };
        let response = send(app(options), "application/json", "42").await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn rejects_oversized_body() {
        let options = BodyParseOptions {
            json_limit: 8,
            ..BodyParseOptions::default()
        };
        let response = send(app(options), "application/json", r#"{"long":"value"}"#).await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn field_reads_json_and_form() {
        let json = ParsedBody::Json(json!({ "_method": "PUT", "n": 1 }));
        assert_eq!(json.field("_method"), Some("PUT"));
        assert_eq!(json.field("n"), None);

        let form = ParsedBody::Form(vec![("_method".into(), "PATCH".into())]);
        assert_eq!(form.field("_method"), Some("PATCH"));
        assert_eq!(ParsedBody::Text("x".into()).field("_method"), None);
    }
}
