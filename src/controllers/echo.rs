/*
 * Responsibility
 * - ANY /echo: middleware が request に載せた値 (request id / method override / parsed body) を返す
 * - 動作確認用
 */
use axum::{
    Json, Router,
    extract::Request,
    routing::any,
};
use serde_json::{Value, json};
use tower_http::request_id::RequestId;

use crate::middleware::body::ParsedBody;
use crate::middleware::method_override::OriginalMethod;

pub fn register(router: Router) -> Router {
    router.route("/echo", any(echo))
}

pub async fn echo(req: Request) -> Json<Value> {
    let extensions = req.extensions();

    let request_id = extensions
        .get::<RequestId>()
        .and_then(|id| id.header_value().to_str().ok())
        .map(str::to_string);
    let original_method = extensions
        .get::<OriginalMethod>()
        .map(|OriginalMethod(m)| m.to_string());
    let body = extensions.get::<ParsedBody>().map(|body| match body {
        ParsedBody::Json(value) => value.clone(),
        ParsedBody::Form(pairs) => pairs
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect::<serde_json::Map<_, _>>()
            .into(),
        ParsedBody::Text(text) => Value::String(text.clone()),
    });

    Json(json!({
        "method": req.method().as_str(),
        "originalMethod": original_method,
        "requestId": request_id,
        "body": body,
    }))
}
