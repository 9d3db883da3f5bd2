/*
 * Responsibility
 * - security header の default 設定 (SecurityConfig) と caller 指定の部分設定 (SecurityOptions)
 * - 部分設定を default に field 単位で merge する (caller wins, 未指定の nested field は default のまま)
 * - header value の組み立て (CSP / HSTS)
 *
 * Lists are replaced wholesale, never concatenated.
 */
use std::collections::BTreeMap;

use serde::Deserialize;

pub const DEFAULT_REFERRER_POLICY: &str = "no-referrer";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityConfig {
    pub csp: CspConfig,
    pub hsts: HstsConfig,
    pub use_xss_filter: bool,
    pub use_no_sniff: bool,
    /// `None` = Referrer-Policy disabled.
    pub referrer_policy: Option<ReferrerPolicyConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CspConfig {
    pub directives: CspDirectives,
    pub report_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CspDirectives {
    pub default_src: Vec<String>,
    pub script_src: Vec<String>,
    pub style_src: Vec<String>,
    pub img_src: Vec<String>,
    pub frame_ancestors: Vec<String>,
    pub report_uri: String,
    /// Any other directive, keyed by camelCase name (`connectSrc`, `upgradeInsecureRequests`).
    pub other: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HstsConfig {
    pub max_age: u64,
    pub include_subdomains: bool,
    pub preload: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferrerPolicyConfig {
    pub policy: String,
}

impl Default for ReferrerPolicyConfig {
    fn default() -> Self {
        Self {
            policy: DEFAULT_REFERRER_POLICY.to_string(),
        }
    }
}

fn self_only() -> Vec<String> {
    vec!["'self'".to_string()]
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            csp: CspConfig {
                directives: CspDirectives {
                    default_src: self_only(),
                    script_src: self_only(),
                    style_src: self_only(),
                    img_src: self_only(),
                    frame_ancestors: self_only(),
                    report_uri: "about:blank".to_string(),
                    other: BTreeMap::new(),
                },
                report_only: true,
            },
            hsts: HstsConfig {
                max_age: 30,
                include_subdomains: true,
                preload: false,
            },
            use_xss_filter: true,
            use_no_sniff: true,
            referrer_policy: None,
        }
    }
}

/* ---------- partial options ---------- */

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityOptions {
    pub csp: Option<CspOptions>,
    pub hsts: Option<HstsOptions>,
    pub use_xss_filter: Option<bool>,
    pub use_no_sniff: Option<bool>,
    pub referrer_policy: Option<ReferrerPolicyOptions>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CspOptions {
    pub directives: Option<CspDirectivesOptions>,
    pub report_only: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CspDirectivesOptions {
    pub default_src: Option<Vec<String>>,
    pub script_src: Option<Vec<String>>,
    pub style_src: Option<Vec<String>>,
    pub img_src: Option<Vec<String>>,
    pub frame_ancestors: Option<Vec<String>>,
    pub report_uri: Option<String>,
    #[serde(flatten)]
    pub other: BTreeMap<String, CspDirectiveOptions>,
}

/// Extra directive value: a source list, or `true` / `false` for valueless directives
/// (`"upgradeInsecureRequests": true`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CspDirectiveOptions {
    Enabled(bool),
    Sources(Vec<String>),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HstsOptions {
    pub max_age: Option<u64>,
    pub include_subdomains: Option<bool>,
    pub preload: Option<bool>,
}

/// `false` / `true` / `{ "policy": "same-origin" }`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ReferrerPolicyOptions {
    Enabled(bool),
    Policy {
        #[serde(default)]
        policy: Option<String>,
    },
}

impl ReferrerPolicyOptions {
    pub fn policy(policy: impl Into<String>) -> Self {
        Self::Policy {
            policy: Some(policy.into()),
        }
    }
}

/* ---------- merge ---------- */

impl SecurityConfig {
    /// Defaults with `options` merged on top.
    pub fn merged(options: SecurityOptions) -> Self {
        let mut config = Self::default();
        config.merge(options);
        config
    }

    pub fn merge(&mut self, options: SecurityOptions) {
        if let Some(csp) = options.csp {
            self.csp.merge(csp);
        }
        if let Some(hsts) = options.hsts {
            self.hsts.merge(hsts);
        }
        if let Some(v) = options.use_xss_filter {
            self.use_xss_filter = v;
        }
        if let Some(v) = options.use_no_sniff {
            self.use_no_sniff = v;
        }
        match options.referrer_policy {
            None => {}
            Some(ReferrerPolicyOptions::Enabled(false)) => self.referrer_policy = None,
            Some(ReferrerPolicyOptions::Enabled(true)) => {
                self.referrer_policy.get_or_insert_with(Default::default);
            }
            Some(ReferrerPolicyOptions::Policy { policy }) => {
                let current = self.referrer_policy.get_or_insert_with(Default::default);
                if let Some(policy) = policy {
                    current.policy = policy;
                }
            }
        }
    }
}

impl CspConfig {
    fn merge(&mut self, options: CspOptions) {
        if let Some(directives) = options.directives {
            self.directives.merge(directives);
        }
        if let Some(v) = options.report_only {
            self.report_only = v;
        }
    }

    /// Rendered policy: `default-src 'self'; script-src 'self'; ...`.
    pub fn header_value(&self) -> String {
        let d = &self.directives;
        let fixed = [
            ("defaultSrc", d.default_src.as_slice()),
            ("scriptSrc", d.script_src.as_slice()),
            ("styleSrc", d.style_src.as_slice()),
            ("imgSrc", d.img_src.as_slice()),
            ("frameAncestors", d.frame_ancestors.as_slice()),
        ];
        let report_uri = [d.report_uri.clone()];

        fixed
            .into_iter()
            .chain(d.other.iter().map(|(k, v)| (k.as_str(), v.as_slice())))
            .chain((!d.report_uri.is_empty()).then_some(("reportUri", report_uri.as_slice())))
            .map(|(name, values)| render_directive(name, values))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

fn render_directive(name: &str, values: &[String]) -> String {
    let name = kebab_case(name);
    if values.is_empty() {
        name
    } else {
        format!("{name} {}", values.join(" "))
    }
}

/// `frameAncestors` -> `frame-ancestors`; already-kebab names pass through.
fn kebab_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            out.push('-');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

impl CspDirectives {
    fn merge(&mut self, options: CspDirectivesOptions) {
        if let Some(v) = options.default_src {
            self.default_src = v;
        }
        if let Some(v) = options.script_src {
            self.script_src = v;
        }
        if let Some(v) = options.style_src {
            self.style_src = v;
        }
        if let Some(v) = options.img_src {
            self.img_src = v;
        }
        if let Some(v) = options.frame_ancestors {
            self.frame_ancestors = v;
        }
        if let Some(v) = options.report_uri {
            self.report_uri = v;
        }
        for (name, value) in options.other {
            match value {
                CspDirectiveOptions::Enabled(false) => {
                    self.other.remove(&name);
                }
                CspDirectiveOptions::Enabled(true) => {
                    self.other.insert(name, Vec::new());
                }
                CspDirectiveOptions::Sources(sources) => {
                    self.other.insert(name, sources);
                }
            }
        }
    }
}

impl HstsConfig {
    fn merge(&mut self, options: HstsOptions) {
        if let Some(v) = options.max_age {
            self.max_age = v;
        }
        if let Some(v) = options.include_subdomains {
            self.include_subdomains = v;
        }
        if let Some(v) = options.preload {
            self.preload = v;
        }
    }

    pub fn header_value(&self) -> String {
        let mut value = format!("max-age={}", self.max_age);
        if self.include_subdomains {
            value.push_str("; includeSubDomains");
        }
        if self.preload {
            value.push_str("; preload");
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SecurityConfig::default();
        assert!(config.csp.report_only);
        assert_eq!(config.csp.directives.report_uri, "about:blank");
        assert_eq!(config.hsts.max_age, 30);
        assert!(config.hsts.include_subdomains);
        assert!(!config.hsts.preload);
        assert!(config.use_xss_filter);
        assert!(config.use_no_sniff);
        assert_eq!(config.referrer_policy, None);
    }

    #[test]
    fn hsts_merge_keeps_unspecified_fields() {
        let config = SecurityConfig::merged(SecurityOptions {
            hsts: Some(HstsOptions {
                max_age: Some(10_886_400),
                ..HstsOptions::default()
            }),
            ..SecurityOptions::default()
        });

        assert_eq!(
            config.hsts,
            HstsConfig {
                max_age: 10_886_400,
                include_subdomains: true,
                preload: false,
            }
        );
        assert_eq!(config.csp, SecurityConfig::default().csp);
    }

    #[test]
    fn csp_merge_overrides_single_directive() {
        let config = SecurityConfig::merged(SecurityOptions {
            csp: Some(CspOptions {
                directives: Some(CspDirectivesOptions {
                    report_uri: Some("http://my-report-uri.com".to_string()),
                    ..CspDirectivesOptions::default()
                }),
                report_only: None,
            }),
            ..SecurityOptions::default()
        });

        let mut expected = SecurityConfig::default().csp;
        expected.directives.report_uri = "http://my-report-uri.com".to_string();
        assert_eq!(config.csp, expected);
    }

    #[test]
    fn merge_from_json() {
        let options: SecurityOptions = serde_json::from_str(
            r#"{
                "csp": { "directives": { "scriptSrc": ["'self'", "cdn.test"], "connectSrc": ["api.test"] }, "reportOnly": false },
                "hsts": { "preload": true },
                "useNoSniff": false,
                "referrerPolicy": { "policy": "same-origin" }
            }"#,
        )
        .expect("options should deserialize");

        let config = SecurityConfig::merged(options);
        assert_eq!(config.csp.directives.script_src, ["'self'", "cdn.test"]);
        assert_eq!(config.csp.directives.default_src, ["'self'"]);
        assert_eq!(config.csp.directives.other["connectSrc"], ["api.test"]);
        assert!(!config.csp.report_only);
        assert!(config.hsts.preload);
        assert_eq!(config.hsts.max_age, 30);
        assert!(!config.use_no_sniff);
        assert!(config.use_xss_filter);
        assert_eq!(
            config.referrer_policy,
            Some(ReferrerPolicyConfig {
                policy: "same-origin".to_string()
            })
        );
    }

    #[test]
    fn valueless_csp_directives_from_json() {
        let options: SecurityOptions = serde_json::from_str(
            r#"{
                "csp": { "directives": {
                    "upgradeInsecureRequests": true,
                    "blockAllMixedContent": [],
                    "sandbox": false
                } }
            }"#,
        )
        .expect("boolean directives should deserialize");

        let config = SecurityConfig::merged(options);
        let other = &config.csp.directives.other;
        assert_eq!(other["upgradeInsecureRequests"], Vec::<String>::new());
        assert_eq!(other["blockAllMixedContent"], Vec::<String>::new());
        assert!(!other.contains_key("sandbox"));
        assert!(
            config
                .csp
                .header_value()
                .contains("; block-all-mixed-content; upgrade-insecure-requests; report-uri")
        );
    }

    #[test]
    fn referrer_policy_toggles() {
        let parse = |json: &str| -> SecurityConfig {
            SecurityConfig::merged(serde_json::from_str(json).expect("options should deserialize"))
        };

        assert_eq!(parse(r#"{ "referrerPolicy": false }"#).referrer_policy, None);
        assert_eq!(
            parse(r#"{ "referrerPolicy": true }"#).referrer_policy,
            Some(ReferrerPolicyConfig::default())
        );
        assert_eq!(
            parse(r#"{ "referrerPolicy": {} }"#).referrer_policy,
            Some(ReferrerPolicyConfig::default())
        );
        assert_eq!(parse("{}").referrer_policy, None);
    }

    #[test]
    fn csp_header_value() {
        let mut csp = SecurityConfig::default().csp;
        assert_eq!(
            csp.header_value(),
            "default-src 'self'; script-src 'self'; style-src 'self'; img-src 'self'; \
             frame-ancestors 'self'; report-uri about:blank"
        );

        csp.directives
            .other
            .insert("upgradeInsecureRequests".to_string(), Vec::new());
        csp.directives.report_uri.clear();
        assert!(csp.header_value().ends_with("frame-ancestors 'self'; upgrade-insecure-requests"));
    }

    #[test]
    fn hsts_header_value() {
        let mut hsts = SecurityConfig::default().hsts;
        assert_eq!(hsts.header_value(), "max-age=30; includeSubDomains");

        hsts.include_subdomains = false;
        hsts.preload = true;
        assert_eq!(hsts.header_value(), "max-age=30; preload");
    }
}
