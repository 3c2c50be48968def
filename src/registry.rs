use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;

/// The callable form of a registered runner: the job's opaque argument
/// string in, a future resolving to the run outcome out.
pub type RunnerFn = dyn Fn(String) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync;

/// Lookup table from runner names to runners.
///
/// The registry is populated before the scheduler starts and never changes
/// afterwards; jobs naming an unknown runner are rejected when they are
/// built, which keeps the dispatch path free of name lookups.
#[derive(Default)]
pub struct RunnerRegistry {
    runners: HashMap<String, Arc<RunnerFn>>,
}

impl RunnerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `runner` under `name`, replacing any previous entry.
    pub fn register<F, Fut>(mut self, name: impl Into<String>, runner: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.runners
            .insert(name.into(), Arc::new(move |args| runner(args).boxed()));
        self
    }

    pub(crate) fn get(&self, name: &str) -> Option<Arc<RunnerFn>> {
        self.runners.get(name).cloned()
    }

    /// Names of all registered runners.
    pub fn names(&self) -> Vec<&str> {
        self.runners.keys().map(String::as_str).collect()
    }
}

impl fmt::Debug for RunnerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunnerRegistry")
            .field("runners", &self.runners.keys().collect::<Vec<_>>())
            .finish()
    }
}
