/*
 * Responsibility
 * - middleware の公開インターフェース (re-export)
 * - 各 module は `apply(router, options)` / layer 生成を持ち、AppBuilder から呼ばれる
 */
pub mod body;
pub mod cors;
pub mod method_override;
pub mod request_id;
pub mod security_headers;
pub mod ssl;

pub use body::{BodyParseOptions, BodyType, ParsedBody};
pub use cors::{CorsOptions, OriginPolicy};
pub use method_override::{MethodOverride, OriginalMethod};
pub use request_id::RequestIdOptions;
pub use security_headers::{SecurityHeader, SecurityHeaderKind};
pub use ssl::{EnforceSslOptions, InsecureAction};
