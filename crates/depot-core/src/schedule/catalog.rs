//! JobCatalog - the jobs a schedule file may name.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::JobDescriptor;
use crate::error::{ConfigError, StartupError};
use crate::ports::JobAction;

use super::scheduler::Scheduler;

/// Job name -> action. The schedule file picks from these by name.
#[derive(Default, Clone)]
pub struct JobCatalog {
    actions: BTreeMap<String, Arc<dyn JobAction>>,
}

impl JobCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_job(mut self, name: impl Into<String>, action: Arc<dyn JobAction>) -> Self {
        self.actions.insert(name.into(), action);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn JobAction>> {
        self.actions.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.actions.keys().map(String::as_str)
    }

    /// Register every descriptor against its catalog action.
    ///
    /// Fails fast: an unknown job name or a malformed expression aborts
    /// before anything is started. Repeated names are registered once.
    pub fn build_scheduler(&self, descriptors: &[JobDescriptor]) -> Result<Scheduler, StartupError> {
        let scheduler = Scheduler::new();
        for descriptor in descriptors {
            let action = self
                .get(&descriptor.name)
                .ok_or_else(|| ConfigError::UnknownJob(descriptor.name.clone()))?;
            scheduler.register_once(descriptor.name.clone(), &descriptor.schedule, action)?;
        }
        Ok(scheduler)
    }
}
