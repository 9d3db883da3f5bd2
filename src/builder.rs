//! Application builder.
//!
//! Wraps an `axum::Router` and registers middleware / controllers in the order the caller
//! asks for. The first registration runs first on the request path (outermost), as in a
//! call-next middleware chain; routes added by a controller are only wrapped by middleware
//! registered before it.
//!
//! `axum` applies `Router::layer` inside-out and only to routes that already exist, so
//! registrations are recorded and folded in reverse by [`AppBuilder::into_router`].

use std::convert::Infallible;
use std::fs;
use std::path::Path;

use axum::Router;
use axum::extract::Request;
use axum::response::IntoResponse;
use axum::routing::Route;
use tower::{Layer, Service};

use crate::controllers::{Controller, ControllerRegistry};
use crate::error::AppError;
use crate::middleware::body::{self, BodyParseOptions};
use crate::middleware::cors::{self, CorsOptions};
use crate::middleware::method_override::{self, MethodOverride};
use crate::middleware::request_id::{self, RequestIdOptions};
use crate::middleware::ssl::{self, EnforceSslOptions};
use crate::services::security::{SecurityMiddlewareFactory, SecurityOptions};

type Step = Box<dyn FnOnce(Router) -> Router + Send>;

pub struct AppBuilder {
    router: Router,
    steps: Vec<Step>,
}

impl AppBuilder {
    pub fn new(router: Router) -> Self {
        Self {
            router,
            steps: Vec::new(),
        }
    }

    fn push(&mut self, step: impl FnOnce(Router) -> Router + Send + 'static) -> &mut Self {
        self.steps.push(Box::new(step));
        self
    }

    /// CORS with `Vary: Origin` and `204` preflight answers.
    pub fn add_cors_support_middleware(&mut self, options: CorsOptions) -> &mut Self {
        self.push(move |router| cors::apply(router, options))
    }

    /// Load controllers by directory convention.
    ///
    /// Every immediate child directory of `directory` holding an `index` entry point is looked
    /// up by name in `registry` and its initializer registered. Children without an entry point
    /// are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::ControllersDir`] when `directory` cannot be read.
    pub fn load_controllers(
        &mut self,
        directory: impl AsRef<Path>,
        registry: &ControllerRegistry,
    ) -> Result<&mut Self, AppError> {
        let directory = directory.as_ref();
        let read_error = |source| AppError::ControllersDir {
            path: directory.to_path_buf(),
            source,
        };

        let mut children = fs::read_dir(directory)
            .map_err(read_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(read_error)?;
        children.sort_by_key(|entry| entry.file_name());

        for entry in children {
            let path = entry.path();
            if !path.is_dir() || !has_entry_point(&path) {
                continue;
            }

            let name = entry.file_name().to_string_lossy().into_owned();
            match registry.get(&name) {
                Some(controller) => {
                    tracing::info!(controller = %name, "loading controller");
                    self.add_controller(controller.clone());
                }
                None => {
                    tracing::warn!(controller = %name, path = %path.display(), "no initializer registered for controller");
                }
            }
        }

        Ok(self)
    }

    /// Register every controller in `registry`, in name order, without touching the filesystem.
    pub fn load_registered_controllers(&mut self, registry: &ControllerRegistry) -> &mut Self {
        for (name, controller) in registry.iter() {
            tracing::info!(controller = %name, "loading controller");
            self.add_controller(controller.clone());
        }
        self
    }

    fn add_controller(&mut self, controller: Controller) -> &mut Self {
        self.push(move |router| controller(router))
    }

    /// Register any layer `Router::layer` accepts, at the current position.
    pub fn add_middleware<L>(&mut self, layer: L) -> &mut Self
    where
        L: Layer<Route> + Clone + Send + Sync + 'static,
        L::Service: Service<Request> + Clone + Send + Sync + 'static,
        <L::Service as Service<Request>>::Response: IntoResponse + 'static,
        <L::Service as Service<Request>>::Error: Into<Infallible> + 'static,
        <L::Service as Service<Request>>::Future: Send + 'static,
    {
        self.push(move |router| router.layer(layer))
    }

    /// Method override runs before routing of everything registered after it.
    pub fn add_method_override_middleware(&mut self, options: MethodOverride) -> &mut Self {
        self.push(move |router| method_override::wrap(router, options))
    }

    pub fn add_body_parse_middleware(&mut self, options: BodyParseOptions) -> &mut Self {
        self.push(move |router| body::apply(router, options))
    }

    pub fn add_request_id_middleware(&mut self, options: RequestIdOptions) -> &mut Self {
        self.push(move |router| request_id::apply(router, options))
    }

    /// Every header from [`SecurityMiddlewareFactory::middlewares`], in list order.
    pub fn add_security_middlewares(&mut self, options: SecurityOptions) -> &mut Self {
        for header in SecurityMiddlewareFactory::new(options).middlewares() {
            self.add_middleware(header.layer());
        }
        self
    }

    pub fn add_enforce_ssl_middleware(&mut self, options: EnforceSslOptions) -> &mut Self {
        self.push(move |router| ssl::apply(router, options))
    }

    pub fn into_router(self) -> Router {
        self.steps
            .into_iter()
            .rev()
            .fold(self.router, |router, step| step(router))
    }
}

/// A file named `index` or `index.<ext>` directly inside `dir`.
fn has_entry_point(dir: &Path) -> bool {
    let Ok(entries) = fs::read_dir(dir) else {
        return false;
    };

    entries.filter_map(Result::ok).any(|entry| {
        let path = entry.path();
        path.is_file() && path.file_stem().is_some_and(|stem| stem == "index")
    })
}
