//! Services, operations and the message structure their concept sets come from.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use matcher::Concept;
use serde::{Deserialize, Serialize};

/// Stable identifier of a service or operation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(Arc<str>);

impl ResourceId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The id viewed as a concept, for matching against resources themselves.
    pub fn as_concept(&self) -> Concept {
        Concept::new(self.as_str())
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ResourceId {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

fn mandatory_default() -> bool {
    true
}

/// One (possibly nested) part of an input or output message.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MessagePart {
    /// Semantic annotation of the part; unannotated parts are ignored.
    #[serde(default)]
    pub model_reference: Option<Concept>,
    #[serde(default = "mandatory_default")]
    pub mandatory: bool,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

impl MessagePart {
    pub fn new(model_reference: impl Into<Concept>) -> Self {
        Self {
            model_reference: Some(model_reference.into()),
            mandatory: true,
            parts: Vec::new(),
        }
    }

    pub fn optional(mut self) -> Self {
        self.mandatory = false;
        self
    }

    pub fn with_part(mut self, part: MessagePart) -> Self {
        self.parts.push(part);
        self
    }
}

/// The parts of one input or output message.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MessageContent {
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

impl MessageContent {
    pub fn new(parts: impl IntoIterator<Item = MessagePart>) -> Self {
        Self {
            parts: parts.into_iter().collect(),
        }
    }

    /// Model references split into `(mandatory, optional)`.
    ///
    /// A nested part is mandatory only if it and every enclosing part are.
    /// A concept listed both ways counts as mandatory.
    pub fn flatten(&self) -> (BTreeSet<Concept>, BTreeSet<Concept>) {
        let mut mandatory = BTreeSet::new();
        let mut optional = BTreeSet::new();
        let mut stack: Vec<(&MessagePart, bool)> = self.parts.iter().map(|p| (p, true)).collect();
        while let Some((part, parent_mandatory)) = stack.pop() {
            let effective = parent_mandatory && part.mandatory;
            if let Some(concept) = &part.model_reference {
                if effective {
                    mandatory.insert(concept.clone());
                } else {
                    optional.insert(concept.clone());
                }
            }
            stack.extend(part.parts.iter().map(|p| (p, effective)));
        }
        optional.retain(|c| !mandatory.contains(c));
        (mandatory, optional)
    }

    /// Every model reference regardless of the mandatory flag.
    pub fn concepts(&self) -> BTreeSet<Concept> {
        let (mut all, optional) = self.flatten();
        all.extend(optional);
        all
    }
}

/// An invokable operation with its flattened concept sets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub id: ResourceId,
    pub service: ResourceId,
    #[serde(default)]
    pub label: String,
    pub required_inputs: BTreeSet<Concept>,
    #[serde(default)]
    pub optional_inputs: BTreeSet<Concept>,
    pub produced_outputs: BTreeSet<Concept>,
}

impl Operation {
    pub fn new(
        id: impl Into<ResourceId>,
        service: impl Into<ResourceId>,
        required_inputs: impl IntoIterator<Item = Concept>,
        produced_outputs: impl IntoIterator<Item = Concept>,
    ) -> Self {
        let id = id.into();
        Self {
            label: id.to_string(),
            id,
            service: service.into(),
            required_inputs: required_inputs.into_iter().collect(),
            optional_inputs: BTreeSet::new(),
            produced_outputs: produced_outputs.into_iter().collect(),
        }
    }

    /// Build an operation from its input and output messages.
    pub fn from_messages(
        id: impl Into<ResourceId>,
        service: impl Into<ResourceId>,
        input: &MessageContent,
        output: &MessageContent,
    ) -> Self {
        let (required, optional) = input.flatten();
        let mut op = Self::new(id, service, required, output.concepts());
        op.optional_inputs = optional;
        op
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_optional_inputs(mut self, inputs: impl IntoIterator<Item = Concept>) -> Self {
        self.optional_inputs.extend(inputs);
        self.optional_inputs.retain(|c| !self.required_inputs.contains(c));
        self
    }

    /// Required followed by optional inputs.
    pub fn all_inputs(&self) -> BTreeSet<Concept> {
        self.required_inputs
            .union(&self.optional_inputs)
            .cloned()
            .collect()
    }
}

/// A service and its operations, in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub id: ResourceId,
    #[serde(default)]
    pub label: String,
    pub operations: Vec<Arc<Operation>>,
}

impl Service {
    pub fn new(id: impl Into<ResourceId>) -> Self {
        let id = id.into();
        Self {
            label: id.to_string(),
            id,
            operations: Vec::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Append an operation, re-parenting it onto this service.
    pub fn with_operation(mut self, mut operation: Operation) -> Self {
        operation.service = self.id.clone();
        self.operations.push(Arc::new(operation));
        self
    }

    pub fn operation(&self, id: &ResourceId) -> Option<&Arc<Operation>> {
        self.operations.iter().find(|op| &op.id == id)
    }
}

/// Anything the catalogue can resolve an id to.
#[derive(Debug, Clone, PartialEq)]
pub enum Resource {
    Service(Arc<Service>),
    Operation(Arc<Operation>),
}

impl Resource {
    pub fn id(&self) -> &ResourceId {
        match self {
            Resource::Service(s) => &s.id,
            Resource::Operation(op) => &op.id,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Resource::Service(s) => &s.label,
            Resource::Operation(op) => &op.label,
        }
    }

    /// Concepts a caller must supply; the union over operations for a service.
    pub fn required_inputs(&self) -> BTreeSet<Concept> {
        match self {
            Resource::Service(s) => s
                .operations
                .iter()
                .flat_map(|op| op.required_inputs.iter().cloned())
                .collect(),
            Resource::Operation(op) => op.required_inputs.clone(),
        }
    }

    /// Concepts produced; the union over operations for a service.
    pub fn produced_outputs(&self) -> BTreeSet<Concept> {
        match self {
            Resource::Service(s) => s
                .operations
                .iter()
                .flat_map(|op| op.produced_outputs.iter().cloned())
                .collect(),
            Resource::Operation(op) => op.produced_outputs.clone(),
        }
    }

    pub fn as_operation(&self) -> Option<&Arc<Operation>> {
        match self {
            Resource::Operation(op) => Some(op),
            Resource::Service(_) => None,
        }
    }

    pub fn as_service(&self) -> Option<&Arc<Service>> {
        match self {
            Resource::Service(s) => Some(s),
            Resource::Operation(_) => None,
        }
    }
}
