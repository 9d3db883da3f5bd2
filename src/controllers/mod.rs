/*
 * Responsibility
 * - controller (route を登録する initializer) の明示的な registry
 * - 名前 → initializer の対応を持つ。directory convention で読む場合も、ここに登録された名前だけが対象
 */
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use axum::Router;

pub mod echo;
pub mod health;

/// Registers a controller's routes (and its own middleware) on the app.
pub type Controller = Arc<dyn Fn(Router) -> Router + Send + Sync>;

#[derive(Clone, Default)]
pub struct ControllerRegistry {
    controllers: BTreeMap<String, Controller>,
}

impl fmt::Debug for ControllerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.controllers.keys()).finish()
    }
}

impl ControllerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(mut self, name: impl Into<String>, controller: F) -> Self
    where
        F: Fn(Router) -> Router + Send + Sync + 'static,
    {
        self.controllers.insert(name.into(), Arc::new(controller));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Controller> {
        self.controllers.get(name)
    }

    /// Name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Controller)> {
        self.controllers.iter().map(|(name, c)| (name.as_str(), c))
    }
}

/// Controllers shipped with the binary.
pub fn registry() -> ControllerRegistry {
    ControllerRegistry::new()
        .register("echo", echo::register)
        .register("health", health::register)
}
