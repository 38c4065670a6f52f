//! Engine context
//!
//! Explicit bundle of everything the engine needs: store handles, the live
//! event channel, configuration, and the per-pipeline leases. Built once at
//! startup and passed into components instead of process-wide singletons.

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::dispatch::PipelineLeases;
use crate::events::EventBroadcaster;
use crate::store::{DeploymentStore, ModuleSource};

pub struct EngineContext {
    pub config: EngineConfig,
    pub modules: Arc<dyn ModuleSource>,
    pub deployments: Arc<dyn DeploymentStore>,
    pub events: EventBroadcaster,
    pub(crate) leases: PipelineLeases,
}

impl EngineContext {
    pub fn new(
        config: EngineConfig,
        modules: Arc<dyn ModuleSource>,
        deployments: Arc<dyn DeploymentStore>,
    ) -> Self {
        Self {
            config,
            modules,
            deployments,
            events: EventBroadcaster::new(),
            leases: PipelineLeases::new(),
        }
    }
}
