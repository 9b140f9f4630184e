use std::fmt;

/* 📖 # Why declare operations as data?

Manifest, Page and Write differ only in how the receiver is obtained, which inputs a
method may ask for and what it returns. Describing each as an OperationContract lets
one validation routine check every user method at start-up, and one invocation
routine drive all of them at request time.

The registry is an explicit value handed to the schema compiler, so a host can swap
in an adjusted contract without touching global state.
*/

/// The lifecycle operations an entity type can offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperationName {
    Manifest,
    Page,
    Write,
}

impl OperationName {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationName::Manifest => "Manifest",
            OperationName::Page => "Page",
            OperationName::Write => "Write",
        }
    }
}

impl fmt::Display for OperationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the receiver of an operation is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Receiver {
    /// A freshly allocated zero value.
    Nil,
    /// The decoded request payload.
    Payload,
    /// The result of running the node's own Manifest first.
    Manifested,
}

/// Semantic meaning of a method parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputRole {
    /// The manifested entity of the parent node.
    Parent,
    /// The decoded request payload, of a type chosen by the method.
    Payload,
    /// The path segment that identifies the node.
    Id,
    /// The requested page number.
    PageNumber,
}

impl fmt::Display for InputRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InputRole::Parent => "parent",
            InputRole::Payload => "payload",
            InputRole::Id => "id",
            InputRole::PageNumber => "page number",
        };
        f.write_str(name)
    }
}

/// Semantic meaning of a method result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputRole {
    Error,
    /// A secondary value; for Page this is the ordered list of item ids.
    OtherValue,
}

/// For which kind of node an operation must be present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Never,
    Singular,
    Collection,
}

/// Shape every method registered under an operation name must have.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationContract {
    name: OperationName,
    receiver: Receiver,
    inputs: Vec<InputRole>,
    optional: Vec<InputRole>,
    outputs: Vec<OutputRole>,
    required: Requirement,
}

impl OperationContract {
    pub fn on(name: OperationName, receiver: Receiver) -> Self {
        Self {
            name,
            receiver,
            inputs: vec![],
            optional: vec![],
            outputs: vec![OutputRole::Error],
            required: Requirement::Never,
        }
    }

    /// Mandatory inputs, in parameter order.
    pub fn inputs(mut self, roles: &[InputRole]) -> Self {
        self.inputs = roles.to_vec();
        self
    }

    /// Optional inputs, consumed in order only as far as the method's arity reaches.
    pub fn optional(mut self, roles: &[InputRole]) -> Self {
        self.optional = roles.to_vec();
        self
    }

    pub fn outputs(mut self, roles: &[OutputRole]) -> Self {
        self.outputs = roles.to_vec();
        self
    }

    pub fn required_when(mut self, requirement: Requirement) -> Self {
        self.required = requirement;
        self
    }

    pub fn name(&self) -> OperationName {
        self.name
    }

    pub fn receiver(&self) -> Receiver {
        self.receiver
    }

    pub fn output_roles(&self) -> &[OutputRole] {
        &self.outputs
    }

    pub fn min_inputs(&self) -> usize {
        self.inputs.len()
    }

    pub fn max_inputs(&self) -> usize {
        self.inputs.len() + self.optional.len()
    }

    /// The roles bound to a method taking `arity` parameters.
    pub fn roles_for_arity(&self, arity: usize) -> Vec<InputRole> {
        self.inputs
            .iter()
            .chain(self.optional.iter())
            .take(arity)
            .copied()
            .collect()
    }

    pub fn is_required(&self, is_collection: bool) -> bool {
        match self.required {
            Requirement::Never => false,
            Requirement::Singular => !is_collection,
            Requirement::Collection => is_collection,
        }
    }
}

/// The set of operation contracts the schema compiler validates against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationRegistry {
    contracts: Vec<OperationContract>,
}

impl OperationRegistry {
    /// Manifest, Page and Write as served over HTTP.
    pub fn builtin() -> Self {
        use InputRole::*;
        Self {
            contracts: vec![
                OperationContract::on(OperationName::Manifest, Receiver::Nil)
                    .optional(&[Parent, Id])
                    .outputs(&[OutputRole::Error])
                    .required_when(Requirement::Singular),
                OperationContract::on(OperationName::Page, Receiver::Nil)
                    .optional(&[PageNumber, Parent, Id])
                    .outputs(&[OutputRole::OtherValue, OutputRole::Error])
                    .required_when(Requirement::Collection),
                OperationContract::on(OperationName::Write, Receiver::Payload)
                    .optional(&[Parent, Id])
                    .outputs(&[OutputRole::Error])
                    .required_when(Requirement::Never),
            ],
        }
    }

    /// Replace the contract registered under the same operation name.
    pub fn with_contract(mut self, contract: OperationContract) -> Self {
        match self
            .contracts
            .iter_mut()
            .find(|existing| existing.name == contract.name)
        {
            Some(existing) => *existing = contract,
            None => self.contracts.push(contract),
        }
        self
    }

    pub fn contract(&self, name: OperationName) -> Option<&OperationContract> {
        self.contracts.iter().find(|contract| contract.name == name)
    }

    pub fn contracts(&self) -> impl Iterator<Item = &OperationContract> {
        self.contracts.iter()
    }
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
