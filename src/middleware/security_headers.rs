//! Security-related response headers for browser clients.
//!
//! Each `SecurityHeader` is one header-setting middleware produced by
//! `SecurityMiddlewareFactory`. Header values are validated per response: an invalid value is
//! logged and the header left out, so building the middleware never fails.

use std::sync::Arc;

use axum::Router;
use axum::http::header::{HeaderName, HeaderValue};
use tower_http::set_header::{MakeHeaderValue, SetResponseHeaderLayer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityHeaderKind {
    ContentSecurityPolicy,
    StrictTransportSecurity,
    XssFilter,
    NoSniff,
    ReferrerPolicy,
}

#[derive(Debug, Clone)]
pub struct SecurityHeader {
    kind: SecurityHeaderKind,
    name: HeaderName,
    value: HeaderText,
}

impl SecurityHeader {
    pub fn new(kind: SecurityHeaderKind, name: HeaderName, value: impl Into<String>) -> Self {
        Self {
            kind,
            name,
            value: HeaderText(Arc::from(value.into())),
        }
    }

    pub fn kind(&self) -> SecurityHeaderKind {
        self.kind
    }

    pub fn name(&self) -> &HeaderName {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value.0
    }

    /// Layer that sets (overrides) this header on every response.
    pub fn layer(&self) -> SetResponseHeaderLayer<HeaderText> {
        SetResponseHeaderLayer::overriding(self.name.clone(), self.value.clone())
    }

    pub fn apply(&self, router: Router) -> Router {
        router.layer(self.layer())
    }
}

/// Header value kept as text until a response is written.
#[derive(Debug, Clone)]
pub struct HeaderText(Arc<str>);

impl<T> MakeHeaderValue<T> for HeaderText {
    fn make_header_value(&mut self, _message: &T) -> Option<HeaderValue> {
        match HeaderValue::from_str(&self.0) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(value = %self.0, error = %err, "invalid security header value");
                None
            }
        }
    }
}
