//! Service registry: stores registered services and their subsystems
//!
//! Descriptors are immutable once registered. Registering an id again
//! replaces the service but keeps its original position, so readiness
//! ordering stays stable across re-registration.

use crate::{EngineError, EngineResult, Service};
use courseflow_types::{ServiceDescriptor, ServiceId, Subsystem, SubsystemDescriptor};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// Index of registered services, owned by one engine instance
#[derive(Clone, Default)]
pub struct ServiceRegistry {
    /// All registered services, keyed by ID
    services: HashMap<ServiceId, Arc<dyn Service>>,
    /// Registration order
    order: Vec<ServiceId>,
    /// Subsystem index, built incrementally
    subsystems: BTreeMap<Subsystem, SubsystemDescriptor>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service under the subsystem named by its descriptor
    pub fn register(&mut self, service: Arc<dyn Service>) -> EngineResult<ServiceId> {
        let descriptor = service.descriptor();
        Self::check_descriptor(descriptor)?;

        let id = descriptor.id.clone();
        let subsystem = descriptor.subsystem;
        let is_entry_point = descriptor.is_entry_point();

        if let Some(previous) = self.services.get(&id) {
            let previous_subsystem = previous.descriptor().subsystem;
            if previous_subsystem != subsystem {
                if let Some(desc) = self.subsystems.get_mut(&previous_subsystem) {
                    desc.remove_service(&id);
                }
            }
        } else {
            self.order.push(id.clone());
        }

        self.subsystems
            .entry(subsystem)
            .or_insert_with(|| SubsystemDescriptor::new(subsystem))
            .add_service(id.clone(), is_entry_point);
        self.services.insert(id.clone(), service);

        tracing::info!(service_id = %id, subsystem = %subsystem, "Service registered");
        Ok(id)
    }

    fn check_descriptor(descriptor: &ServiceDescriptor) -> EngineResult<()> {
        if descriptor.id.as_str().trim().is_empty() {
            return Err(EngineError::InvalidRegistration(
                "service id must not be empty".to_string(),
            ));
        }
        if descriptor.dependencies.contains(&descriptor.id) {
            return Err(EngineError::InvalidRegistration(format!(
                "service '{}' depends on itself",
                descriptor.id
            )));
        }
        Ok(())
    }

    /// Get a service by ID
    pub fn get(&self, id: &ServiceId) -> EngineResult<Arc<dyn Service>> {
        self.services
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::ServiceNotFound(id.clone()))
    }

    /// Get a service descriptor by ID
    pub fn descriptor(&self, id: &ServiceId) -> EngineResult<&ServiceDescriptor> {
        self.services
            .get(id)
            .map(|s| s.descriptor())
            .ok_or_else(|| EngineError::ServiceNotFound(id.clone()))
    }

    /// Descriptors of a subsystem's services, in registration order
    pub fn services_of(&self, subsystem: Subsystem) -> Vec<&ServiceDescriptor> {
        self.subsystems
            .get(&subsystem)
            .map(|desc| {
                desc.services
                    .iter()
                    .filter_map(|id| self.services.get(id))
                    .map(|s| s.descriptor())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn subsystem(&self, subsystem: Subsystem) -> Option<&SubsystemDescriptor> {
        self.subsystems.get(&subsystem)
    }

    pub fn subsystems(&self) -> impl Iterator<Item = &SubsystemDescriptor> {
        self.subsystems.values()
    }

    /// All descriptors, in registration order
    pub fn list(&self) -> Vec<&ServiceDescriptor> {
        self.order
            .iter()
            .filter_map(|id| self.services.get(id))
            .map(|s| s.descriptor())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn contains(&self, id: &ServiceId) -> bool {
        self.services.contains_key(id)
    }

    /// Remove a service
    pub fn unregister(&mut self, id: &ServiceId) -> EngineResult<Arc<dyn Service>> {
        let service = self
            .services
            .remove(id)
            .ok_or_else(|| EngineError::ServiceNotFound(id.clone()))?;

        self.order.retain(|i| i != id);
        let subsystem = service.descriptor().subsystem;
        if let Some(desc) = self.subsystems.get_mut(&subsystem) {
            desc.remove_service(id);
            if desc.is_empty() {
                self.subsystems.remove(&subsystem);
            }
        }

        tracing::info!(service_id = %id, "Service unregistered");
        Ok(service)
    }

    /// Check that every dependency names a registered service and that the
    /// dependency graph is acyclic
    pub fn validate(&self) -> EngineResult<()> {
        for descriptor in self.list() {
            for dependency in &descriptor.dependencies {
                if !self.services.contains_key(dependency) {
                    return Err(EngineError::UnknownDependency {
                        service: descriptor.id.clone(),
                        dependency: dependency.clone(),
                    });
                }
            }
        }

        let mut done = HashSet::new();
        for id in &self.order {
            let mut path = Vec::new();
            self.visit(id, &mut path, &mut done)?;
        }
        Ok(())
    }

    fn visit(
        &self,
        id: &ServiceId,
        path: &mut Vec<ServiceId>,
        done: &mut HashSet<ServiceId>,
    ) -> EngineResult<()> {
        if done.contains(id) {
            return Ok(());
        }
        if let Some(pos) = path.iter().position(|p| p == id) {
            let mut cycle = path[pos..].to_vec();
            cycle.push(id.clone());
            return Err(EngineError::DependencyCycle(cycle));
        }

        path.push(id.clone());
        if let Some(service) = self.services.get(id) {
            for dependency in &service.descriptor().dependencies {
                self.visit(dependency, path, done)?;
            }
        }
        path.pop();
        done.insert(id.clone());
        Ok(())
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services", &self.order)
            .field("subsystems", &self.subsystems.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FnService, ServiceOutput};
    use courseflow_types::ExecutionState;

    fn service(descriptor: ServiceDescriptor) -> Arc<dyn Service> {
        Arc::new(FnService::new(descriptor, |_: &ExecutionState| {
            Ok(ServiceOutput::new())
        }))
    }

    fn content(id: &str) -> ServiceDescriptor {
        ServiceDescriptor::new(id, Subsystem::Content, id)
    }

    #[test]
    fn test_register_and_get() {
        let mut registry = ServiceRegistry::new();
        let id = registry.register(service(content("a"))).unwrap();

        assert_eq!(registry.descriptor(&id).unwrap().name, "a");
        assert_eq!(registry.len(), 1);
        let desc = registry.subsystem(Subsystem::Content).unwrap();
        assert_eq!(desc.entry_points, vec![ServiceId::new("a")]);
    }

    #[test]
    fn test_get_nonexistent() {
        let registry = ServiceRegistry::new();
        let result = registry.get(&ServiceId::new("nonexistent"));
        assert!(matches!(result, Err(EngineError::ServiceNotFound(_))));
    }

    #[test]
    fn test_register_is_idempotent_by_id() {
        let mut registry = ServiceRegistry::new();
        registry.register(service(content("a"))).unwrap();
        registry.register(service(content("b"))).unwrap();
        registry
            .register(service(content("a").with_description("v2")))
            .unwrap();

        assert_eq!(registry.len(), 2);
        let ids: Vec<&ServiceId> = registry.list().into_iter().map(|d| &d.id).collect();
        assert_eq!(ids, vec![&ServiceId::new("a"), &ServiceId::new("b")]);
        assert_eq!(
            registry.descriptor(&ServiceId::new("a")).unwrap().description,
            "v2"
        );
    }

    #[test]
    fn test_reregister_moves_subsystem() {
        let mut registry = ServiceRegistry::new();
        registry.register(service(content("a"))).unwrap();
        registry
            .register(service(ServiceDescriptor::new("a", Subsystem::Learner, "a")))
            .unwrap();

        assert!(registry.services_of(Subsystem::Content).is_empty());
        assert_eq!(registry.services_of(Subsystem::Learner).len(), 1);
    }

    #[test]
    fn test_self_dependency_rejected() {
        let mut registry = ServiceRegistry::new();
        let result = registry.register(service(content("a").depends_on("a")));
        assert!(matches!(result, Err(EngineError::InvalidRegistration(_))));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_services_of_in_order() {
        let mut registry = ServiceRegistry::new();
        registry.register(service(content("b"))).unwrap();
        registry
            .register(service(ServiceDescriptor::new("x", Subsystem::Metrics, "x")))
            .unwrap();
        registry.register(service(content("a"))).unwrap();

        let ids: Vec<_> = registry
            .services_of(Subsystem::Content)
            .iter()
            .map(|d| d.id.clone())
            .collect();
        assert_eq!(ids, vec![ServiceId::new("b"), ServiceId::new("a")]);
        assert!(registry.services_of(Subsystem::Review).is_empty());
    }

    #[test]
    fn test_unregister() {
        let mut registry = ServiceRegistry::new();
        let id = registry.register(service(content("a"))).unwrap();
        registry.unregister(&id).unwrap();

        assert!(!registry.contains(&id));
        assert!(registry.subsystem(Subsystem::Content).is_none());
        assert!(matches!(
            registry.unregister(&id),
            Err(EngineError::ServiceNotFound(_))
        ));
    }

    #[test]
    fn test_validate_unknown_dependency() {
        let mut registry = ServiceRegistry::new();
        registry
            .register(service(content("b").depends_on("ghost")))
            .unwrap();
        assert!(matches!(
            registry.validate(),
            Err(EngineError::UnknownDependency { .. })
        ));
    }

    #[test]
    fn test_validate_cycle() {
        let mut registry = ServiceRegistry::new();
        registry
            .register(service(content("a").depends_on("c")))
            .unwrap();
        registry
            .register(service(content("b").depends_on("a")))
            .unwrap();
        registry
            .register(service(content("c").depends_on("b")))
            .unwrap();

        match registry.validate() {
            Err(EngineError::DependencyCycle(cycle)) => {
                assert_eq!(cycle.first(), cycle.last());
                assert_eq!(cycle.len(), 4);
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_acyclic() {
        let mut registry = ServiceRegistry::new();
        registry.register(service(content("a"))).unwrap();
        registry
            .register(service(content("b").depends_on("a")))
            .unwrap();
        assert!(registry.validate().is_ok());
    }
}
