//! JSON catalogue documents.
//!
//! A document carries the concept hierarchy used by the in-process matcher
//! and the services to plan over:
//!
//! ```json
//! {
//!   "concepts": [{ "id": "ex:Car", "parents": ["ex:Vehicle"] }],
//!   "services": [{
//!     "id": "svc:dealer",
//!     "operations": [{
//!       "id": "op:quote",
//!       "requires": ["ex:Car"],
//!       "produces": ["ex:Price"]
//!     }]
//!   }]
//! }
//! ```
//!
//! Operations may list concepts directly (`requires` / `optional` /
//! `produces`), describe full `input` / `output` messages, or both; the two
//! are merged.

use std::fs;
use std::path::Path;

use matcher::{Concept, ConceptDefinition};
use serde::{Deserialize, Serialize};

use crate::backend::InMemoryCatalogue;
use crate::model::{MessageContent, Operation, ResourceId, Service};
use crate::CatalogueError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationDefinition {
    pub id: ResourceId,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub input: MessageContent,
    #[serde(default)]
    pub output: MessageContent,
    #[serde(default)]
    pub requires: Vec<Concept>,
    #[serde(default)]
    pub optional: Vec<Concept>,
    #[serde(default)]
    pub produces: Vec<Concept>,
}

impl OperationDefinition {
    fn build(&self, service: &ResourceId) -> Operation {
        let mut op = Operation::from_messages(self.id.clone(), service.clone(), &self.input, &self.output);
        op.required_inputs.extend(self.requires.iter().cloned());
        op.produced_outputs.extend(self.produces.iter().cloned());
        let op = op.with_optional_inputs(self.optional.iter().cloned());
        match &self.label {
            Some(label) => op.with_label(label.clone()),
            None => op,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceDefinition {
    pub id: ResourceId,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub operations: Vec<OperationDefinition>,
}

impl ServiceDefinition {
    pub fn build(&self) -> Service {
        let mut service = Service::new(self.id.clone());
        if let Some(label) = &self.label {
            service = service.with_label(label.clone());
        }
        for op in &self.operations {
            service = service.with_operation(op.build(&self.id));
        }
        service
    }
}

/// Parsed contents of a catalogue file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogueDocument {
    #[serde(default)]
    pub concepts: Vec<ConceptDefinition>,
    #[serde(default)]
    pub services: Vec<ServiceDefinition>,
}

impl CatalogueDocument {
    pub fn from_json(json: &str) -> Result<Self, CatalogueError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CatalogueError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)?;
        let doc = Self::from_json(&raw)?;
        tracing::info!(
            path = %path.display(),
            services = doc.services.len(),
            concepts = doc.concepts.len(),
            "catalogue: loaded document"
        );
        Ok(doc)
    }

    /// Materialise the services into an in-memory catalogue.
    pub fn to_catalogue(&self) -> Result<InMemoryCatalogue, CatalogueError> {
        InMemoryCatalogue::from_services(self.services.iter().map(ServiceDefinition::build))
    }
}
