//! Completion hooks.
//!
//! A workflow names the hooks it fires; the registry, built once at start-up,
//! maps those names to handlers. Handlers run on spawned tasks and their
//! failures are logged, never reported back to the saga.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio::task::JoinHandle;

type HookFn = Arc<dyn Fn(serde_json::Value) -> BoxFuture<'static, Result<(), String>> + Send + Sync>;

#[derive(Clone, Default)]
pub struct HookRegistry {
    handlers: Arc<HashMap<&'static str, Vec<HookFn>>>,
}

impl HookRegistry {
    pub fn builder() -> HookRegistryBuilder {
        HookRegistryBuilder::default()
    }

    pub fn handler_count(&self, hook: &str) -> usize {
        self.handlers.get(hook).map_or(0, Vec::len)
    }

    /// Spawns every handler of `hook` with `payload`.
    ///
    /// Returns the spawned tasks; callers are free to drop them.
    pub fn fire(&self, hook: &'static str, payload: &serde_json::Value) -> Vec<JoinHandle<()>> {
        let Some(handlers) = self.handlers.get(hook) else {
            return Vec::new();
        };

        handlers
            .iter()
            .map(|handler| {
                let handler = Arc::clone(handler);
                let payload = payload.clone();
                tokio::spawn(async move {
                    if let Err(error) = handler(payload).await {
                        metrics::counter!("saga_hook_failures", "hook" => hook).increment(1);
                        tracing::warn!(hook, %error, "hook handler failed");
                    }
                })
            })
            .collect()
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistry")
            .field("hooks", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[derive(Default)]
pub struct HookRegistryBuilder {
    handlers: HashMap<&'static str, Vec<HookFn>>,
}

impl HookRegistryBuilder {
    pub fn on<F, Fut>(mut self, hook: &'static str, handler: F) -> Self
    where
        F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        let handler: HookFn = Arc::new(move |payload| Box::pin(handler(payload)));
        self.handlers.entry(hook).or_default().push(handler);
        self
    }

    pub fn build(self) -> HookRegistry {
        HookRegistry {
            handlers: Arc::new(self.handlers),
        }
    }
}
