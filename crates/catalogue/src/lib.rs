//! # capmatch Catalogue (`catalogue`)
//!
//! Read-only access to the services and operations the engine plans over.
//!
//! - [`Catalogue`]: the collaborator trait (`list_resource_ids`, `resolve`).
//! - [`InMemoryCatalogue`]: `RwLock`-guarded implementation used by tests,
//!   benches and the CLI.
//! - [`Operation`] / [`Service`]: flattened concept sets per operation, built
//!   directly or from nested [`MessageContent`].
//! - [`CatalogueDocument`]: JSON file format, including the concept
//!   hierarchy for the in-process matcher.

mod backend;
mod document;
mod error;
mod model;

pub use crate::backend::{Catalogue, InMemoryCatalogue};
pub use crate::document::{CatalogueDocument, OperationDefinition, ServiceDefinition};
pub use crate::error::CatalogueError;
pub use crate::model::{MessageContent, MessagePart, Operation, Resource, ResourceId, Service};
