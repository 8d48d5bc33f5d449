use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::model::{Operation, Resource, ResourceId, Service};
use crate::CatalogueError;

/// Read-only view of the services and operations known to the system.
///
/// Implementations may be backed by anything (a registry service, a
/// database, a file); the engine only ever reads through this trait.
pub trait Catalogue: Send + Sync {
    /// Every resolvable id, unique, in catalogue order: each service id
    /// followed by the ids of its operations.
    fn list_resource_ids(&self) -> Vec<ResourceId>;

    /// Look up a service or operation.
    fn resolve(&self, id: &ResourceId) -> Option<Resource>;

    /// All services, in catalogue order.
    fn services(&self) -> Vec<Arc<Service>> {
        self.list_resource_ids()
            .iter()
            .filter_map(|id| match self.resolve(id) {
                Some(Resource::Service(s)) => Some(s),
                _ => None,
            })
            .collect()
    }

    fn operation(&self, id: &ResourceId) -> Option<Arc<Operation>> {
        match self.resolve(id)? {
            Resource::Operation(op) => Some(op),
            Resource::Service(_) => None,
        }
    }

    /// All operations, grouped by service in catalogue order.
    fn operations(&self) -> Vec<Arc<Operation>> {
        self.services()
            .iter()
            .flat_map(|s| s.operations.iter().cloned())
            .collect()
    }
}

#[derive(Default)]
struct Entries {
    order: Vec<ResourceId>,
    resources: HashMap<ResourceId, Resource>,
}

/// A catalogue held in memory behind a `RwLock`.
#[derive(Default)]
pub struct InMemoryCatalogue {
    entries: RwLock<Entries>,
}

impl InMemoryCatalogue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from services, rejecting any repeated service or operation id.
    pub fn from_services(services: impl IntoIterator<Item = Service>) -> Result<Self, CatalogueError> {
        let catalogue = Self::new();
        for service in services {
            catalogue.insert_service(service)?;
        }
        Ok(catalogue)
    }

    /// Add a service and its operations. Nothing is inserted if any id clashes.
    pub fn insert_service(&self, service: Service) -> Result<(), CatalogueError> {
        let mut guard = self
            .entries
            .write()
            .map_err(|_| CatalogueError::backend("poisoned lock"))?;

        let mut ids = vec![service.id.clone()];
        ids.extend(service.operations.iter().map(|op| op.id.clone()));
        for (idx, id) in ids.iter().enumerate() {
            if guard.resources.contains_key(id) || ids[..idx].contains(id) {
                return Err(CatalogueError::DuplicateId(id.to_string()));
            }
        }
        for op in &service.operations {
            if op.service != service.id {
                return Err(CatalogueError::invalid(
                    op.id.as_str(),
                    format!("belongs to {} but listed under {}", op.service, service.id),
                ));
            }
        }

        tracing::debug!(
            service = %service.id,
            operations = service.operations.len(),
            "catalogue: inserting service"
        );
        let service = Arc::new(service);
        guard.order.push(service.id.clone());
        guard
            .resources
            .insert(service.id.clone(), Resource::Service(service.clone()));
        for op in &service.operations {
            guard.order.push(op.id.clone());
            guard
                .resources
                .insert(op.id.clone(), Resource::Operation(op.clone()));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .map(|guard| guard.order.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Catalogue for InMemoryCatalogue {
    fn list_resource_ids(&self) -> Vec<ResourceId> {
        match self.entries.read() {
            Ok(guard) => guard.order.clone(),
            Err(poisoned) => poisoned.into_inner().order.clone(),
        }
    }

    fn resolve(&self, id: &ResourceId) -> Option<Resource> {
        match self.entries.read() {
            Ok(guard) => guard.resources.get(id).cloned(),
            Err(poisoned) => poisoned.into_inner().resources.get(id).cloned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matcher::Concept;

    fn op(id: &str, service: &str, inputs: &[&str], outputs: &[&str]) -> Operation {
        Operation::new(
            id,
            service,
            inputs.iter().map(|c| Concept::new(*c)),
            outputs.iter().map(|c| Concept::new(*c)),
        )
    }

    fn sample() -> InMemoryCatalogue {
        InMemoryCatalogue::from_services([
            Service::new("svc:b")
                .with_operation(op("op:b1", "svc:b", &["ex:A"], &["ex:B"]))
                .with_operation(op("op:b2", "svc:b", &["ex:B"], &["ex:C"])),
            Service::new("svc:a").with_operation(op("op:a1", "svc:a", &["ex:C"], &["ex:D"])),
        ])
        .unwrap()
    }

    #[test]
    fn ids_follow_insertion_order() {
        let catalogue = sample();
        let ids: Vec<String> = catalogue
            .list_resource_ids()
            .iter()
            .map(|id| id.to_string())
            .collect();
        assert_eq!(ids, vec!["svc:b", "op:b1", "op:b2", "svc:a", "op:a1"]);
        assert_eq!(catalogue.len(), 5);
    }

    #[test]
    fn services_and_operations_resolve() {
        let catalogue = sample();
        let services = catalogue.services();
        assert_eq!(services.len(), 2);
        assert_eq!(services[0].id.as_str(), "svc:b");

        let b2 = catalogue.operation(&"op:b2".into()).unwrap();
        assert_eq!(b2.service.as_str(), "svc:b");
        assert!(catalogue.operation(&"svc:b".into()).is_none());
        assert!(catalogue.resolve(&"missing".into()).is_none());
        assert_eq!(catalogue.operations().len(), 3);
    }

    #[test]
    fn duplicate_ids_are_rejected_atomically() {
        let catalogue = sample();
        let clash = Service::new("svc:c")
            .with_operation(op("op:new", "svc:c", &[], &[]))
            .with_operation(op("op:b1", "svc:c", &[], &[]));
        let err = catalogue.insert_service(clash).unwrap_err();
        assert!(matches!(err, CatalogueError::DuplicateId(id) if id == "op:b1"));
        assert!(catalogue.resolve(&"op:new".into()).is_none());
        assert!(catalogue.resolve(&"svc:c".into()).is_none());
    }

    #[test]
    fn foreign_operation_is_invalid() {
        let mut svc = Service::new("svc:x");
        svc.operations
            .push(Arc::new(op("op:x", "svc:other", &[], &[])));
        let err = InMemoryCatalogue::from_services([svc]).err().unwrap();
        assert!(matches!(err, CatalogueError::InvalidResource { .. }));
    }
}
