//! Closed worker-type registry for dispatch by name.

use std::collections::HashMap;

use serde_json::Value;

use crate::params::{ParamSpec, Params};
use crate::worker::{Worker, WorkerContext, WorkerEnv, WorkerError};
use crate::workers::export::{ExportCoordinator, PageExporter};
use crate::workers::import::StorageLoader;
use crate::workers::waiter::JobWaiter;

/// A registrable worker type: a stable name, a declared parameter
/// schema, and a constructor from bound parameters.
pub trait WorkerDef: Worker + Sized + 'static {
    /// The name this type is registered and dispatched under.
    const NAME: &'static str;

    /// The declared parameter schema.
    fn params() -> Vec<ParamSpec>;

    /// Construct from bound parameters. Schema violations have already
    /// failed in [`Params::bind`]; this may reject further invariants.
    fn build(params: Params, ctx: WorkerContext) -> Result<Self, WorkerError>;
}

type Factory =
    Box<dyn Fn(&Value, &WorkerEnv, i64, i64) -> Result<Box<dyn Worker>, WorkerError> + Send + Sync>;

/// Maps worker type names to constructors. The set is closed at build
/// time: registering a duplicate name panics, dispatching an unknown
/// name fails fast with [`WorkerError::UnknownWorker`].
#[derive(Default)]
pub struct WorkerRegistry {
    factories: HashMap<&'static str, Factory>,
}

impl WorkerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in worker types.
    pub fn with_builtins() -> Self {
        Self::new()
            .register::<JobWaiter>()
            .register::<StorageLoader>()
            .register::<PageExporter>()
            .register::<ExportCoordinator>()
    }

    /// Register a worker type.
    ///
    /// # Panics
    ///
    /// Panics if the name is already registered.
    pub fn register<W: WorkerDef>(mut self) -> Self {
        let factory: Factory = Box::new(|raw, env, instance_id, execution_id| {
            let params = Params::bind(&W::params(), raw)?;
            let ctx = WorkerContext::new(env.clone(), W::NAME, instance_id, execution_id);
            Ok(Box::new(W::build(params, ctx)?) as Box<dyn Worker>)
        });
        let previous = self.factories.insert(W::NAME, factory);
        assert!(
            previous.is_none(),
            "worker type '{}' registered twice",
            W::NAME
        );
        self
    }

    /// Whether `name` is a registered worker type.
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Bind `raw` parameters and construct the named worker.
    pub fn build(
        &self,
        name: &str,
        raw: &Value,
        env: &WorkerEnv,
        instance_id: i64,
        execution_id: i64,
    ) -> Result<Box<dyn Worker>, WorkerError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| WorkerError::UnknownWorker(name.to_string()))?;
        factory(raw, env, instance_id, execution_id)
    }
}
