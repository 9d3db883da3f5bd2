/// Factory: build security-header middleware from merged `SecurityConfig`.
use axum::http::header;

use crate::middleware::security_headers::{SecurityHeader, SecurityHeaderKind};
use crate::services::security::config::{DEFAULT_REFERRER_POLICY, SecurityConfig, SecurityOptions};

const XSS_FILTER_VALUE: &str = "1; mode=block";

#[derive(Debug, Clone)]
pub struct SecurityMiddlewareFactory {
    config: SecurityConfig,
}

impl Default for SecurityMiddlewareFactory {
    fn default() -> Self {
        Self::new(SecurityOptions::default())
    }
}

impl SecurityMiddlewareFactory {
    pub fn new(options: SecurityOptions) -> Self {
        Self {
            config: SecurityConfig::merged(options),
        }
    }

    pub fn config(&self) -> &SecurityConfig {
        &self.config
    }

    pub fn csp_middleware(&self) -> SecurityHeader {
        let csp = &self.config.csp;
        let name = if csp.report_only {
            header::CONTENT_SECURITY_POLICY_REPORT_ONLY
        } else {
            header::CONTENT_SECURITY_POLICY
        };
        SecurityHeader::new(SecurityHeaderKind::ContentSecurityPolicy, name, csp.header_value())
    }

    pub fn hsts_middleware(&self) -> SecurityHeader {
        SecurityHeader::new(
            SecurityHeaderKind::StrictTransportSecurity,
            header::STRICT_TRANSPORT_SECURITY,
            self.config.hsts.header_value(),
        )
    }

    pub fn xss_filter_middleware(&self) -> SecurityHeader {
        SecurityHeader::new(
            SecurityHeaderKind::XssFilter,
            header::X_XSS_PROTECTION,
            XSS_FILTER_VALUE,
        )
    }

    pub fn no_sniff_middleware(&self) -> SecurityHeader {
        SecurityHeader::new(
            SecurityHeaderKind::NoSniff,
            header::X_CONTENT_TYPE_OPTIONS,
            "nosniff",
        )
    }

    /// Falls back to `no-referrer` when the policy is disabled in config.
    pub fn referrer_policy_middleware(&self) -> SecurityHeader {
        let policy = self
            .config
            .referrer_policy
            .as_ref()
            .map_or(DEFAULT_REFERRER_POLICY, |r| r.policy.as_str());
        SecurityHeader::new(
            SecurityHeaderKind::ReferrerPolicy,
            header::REFERRER_POLICY,
            policy,
        )
    }

    /// CSP and HSTS always, then the enabled optional headers, in that order.
    pub fn middlewares(&self) -> Vec<SecurityHeader> {
        let mut middlewares = vec![self.csp_middleware(), self.hsts_middleware()];

        if self.config.use_xss_filter {
            middlewares.push(self.xss_filter_middleware());
        }
        if self.config.use_no_sniff {
            middlewares.push(self.no_sniff_middleware());
        }
        if self.config.referrer_policy.is_some() {
            middlewares.push(self.referrer_policy_middleware());
        }

        middlewares
    }
}

#[cfg(test)]
mod tests {
    use axum::Router;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::get;
    use tower::ServiceExt;

    use super::*;
    use crate::services::security::config::{HstsOptions, ReferrerPolicyOptions};
    use crate::middleware::security_headers::SecurityHeaderKind::*;

    fn kinds(factory: &SecurityMiddlewareFactory) -> Vec<SecurityHeaderKind> {
        factory.middlewares().iter().map(SecurityHeader::kind).collect()
    }

    #[test]
    fn default_middlewares() {
        let factory = SecurityMiddlewareFactory::default();
        assert_eq!(
            kinds(&factory),
            [ContentSecurityPolicy, StrictTransportSecurity, XssFilter, NoSniff]
        );
    }

    #[test]
    fn referrer_policy_is_appended_when_configured() {
        let factory = SecurityMiddlewareFactory::new(SecurityOptions {
            referrer_policy: Some(ReferrerPolicyOptions::policy("same-origin")),
            ..SecurityOptions::default()
        });
        let middlewares = factory.middlewares();
        assert_eq!(middlewares.len(), 5);

        let last = middlewares.last().expect("list should not be empty");
        assert_eq!(last.kind(), ReferrerPolicy);
        assert_eq!(last.value(), "same-origin");
    }

    #[test]
    fn disabled_headers_are_absent() {
        let without_xss = SecurityMiddlewareFactory::new(SecurityOptions {
            use_xss_filter: Some(false),
            ..SecurityOptions::default()
        });
        assert_eq!(
            kinds(&without_xss),
            [ContentSecurityPolicy, StrictTransportSecurity, NoSniff]
        );

        let without_no_sniff = SecurityMiddlewareFactory::new(SecurityOptions {
            use_no_sniff: Some(false),
            ..SecurityOptions::default()
        });
        assert_eq!(
            kinds(&without_no_sniff),
            [ContentSecurityPolicy, StrictTransportSecurity, XssFilter]
        );
    }

    #[test]
    fn csp_header_name_follows_report_only() {
        let factory = SecurityMiddlewareFactory::default();
        assert_eq!(
            factory.csp_middleware().name(),
            &header::CONTENT_SECURITY_POLICY_REPORT_ONLY
        );

        let enforcing: SecurityOptions =
            serde_json::from_str(r#"{ "csp": { "reportOnly": false } }"#)
                .expect("options should deserialize");
        let factory = SecurityMiddlewareFactory::new(enforcing);
        assert_eq!(factory.csp_middleware().name(), &header::CONTENT_SECURITY_POLICY);
    }

    #[test]
    fn hsts_uses_merged_config() {
        let factory = SecurityMiddlewareFactory::new(SecurityOptions {
            hsts: Some(HstsOptions {
                max_age: Some(10_886_400),
                ..HstsOptions::default()
            }),
            ..SecurityOptions::default()
        });
        assert_eq!(
            factory.hsts_middleware().value(),
            "max-age=10886400; includeSubDomains"
        );
    }

    async fn referrer_header(factory: SecurityMiddlewareFactory) -> String {
        let response = factory
            .referrer_policy_middleware()
            .apply(Router::new().route("/", get(|| async { StatusCode::OK })))
            .oneshot(Request::get("/").body(Body::empty()).expect("request should build"))
            .await
            .expect("request should succeed");

        response.headers()[header::REFERRER_POLICY]
            .to_str()
            .expect("header should be ascii")
            .to_string()
    }

    #[tokio::test]
    async fn referrer_policy_defaults_to_no_referrer() {
        assert_eq!(
            referrer_header(SecurityMiddlewareFactory::default()).await,
            "no-referrer"
        );
    }

    #[tokio::test]
    async fn referrer_policy_sets_configured_policy() {
        let factory = SecurityMiddlewareFactory::new(SecurityOptions {
            referrer_policy: Some(ReferrerPolicyOptions::policy("same-origin")),
            ..SecurityOptions::default()
        });
        assert_eq!(referrer_header(factory).await, "same-origin");
    }
}
