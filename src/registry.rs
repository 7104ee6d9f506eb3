//! Backend registry
//!
//! Maps backend identifiers to set-up adapter instances and resolves the
//! configured enable/order lists into a dispatch order.

use crate::backend::{CloudflareBackend, PurgeBackend, VarnishBackend};
use crate::config::PurgeConfig;
use crate::error::{PurgeError, Result};
use crate::models::BackendId;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Resolve the dispatch order
///
/// Both lists are normalized, then `order` is filtered down to the backends
/// present in `enabled`, keeping `order`'s sequence and dropping repeats.
/// An empty `enabled` list yields an empty order.
pub fn resolve_order<E, O>(enabled: &[E], order: &[O]) -> Vec<BackendId>
where
    E: AsRef<str>,
    O: AsRef<str>,
{
    let enabled: Vec<BackendId> = enabled
        .iter()
        .map(|name| BackendId::normalize(name.as_ref()))
        .collect();

    let mut resolved: Vec<BackendId> = Vec::new();
    for name in order {
        let id = BackendId::normalize(name.as_ref());
        if enabled.contains(&id) && !resolved.contains(&id) {
            resolved.push(id);
        }
    }
    resolved
}

/// Owns backend instances for the lifetime of one purge invocation
pub struct BackendRegistry {
    config: Arc<PurgeConfig>,
    instances: HashMap<BackendId, Arc<dyn PurgeBackend>>,
}

impl BackendRegistry {
    pub fn new(config: Arc<PurgeConfig>) -> Self {
        BackendRegistry {
            config,
            instances: HashMap::new(),
        }
    }

    /// Dispatch order from the registry's configuration
    pub fn resolve(&self) -> Vec<BackendId> {
        resolve_order(&self.config.enabled_services, &self.config.service_order)
    }

    /// Get a set-up backend, constructing it on first use
    ///
    /// A backend whose setup fails is not cached.
    pub fn get(&mut self, id: &BackendId) -> Result<Arc<dyn PurgeBackend>> {
        if let Some(instance) = self.instances.get(id) {
            return Ok(Arc::clone(instance));
        }

        let mut instance: Box<dyn PurgeBackend> = match id {
            BackendId::Cloudflare => Box::new(CloudflareBackend::new()),
            BackendId::Varnish => Box::new(VarnishBackend::new()),
            BackendId::Unknown(name) => return Err(PurgeError::UnknownBackend(name.clone())),
        };
        instance.setup(&self.config)?;
        debug!("Constructed purge backend {}", id);

        let instance: Arc<dyn PurgeBackend> = Arc::from(instance);
        self.instances.insert(id.clone(), Arc::clone(&instance));
        Ok(instance)
    }

    /// Number of backends constructed so far
    pub fn constructed(&self) -> usize {
        self.instances.len()
    }
}
