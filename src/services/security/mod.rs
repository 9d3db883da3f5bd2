pub mod config;
pub mod factory;

pub use config::{
    CspDirectiveOptions, CspOptions, HstsOptions, ReferrerPolicyOptions, SecurityConfig, SecurityOptions,
};
pub use factory::SecurityMiddlewareFactory;
