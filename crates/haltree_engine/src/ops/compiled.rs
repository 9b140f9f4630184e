use haltree_base::{HaltreeError, HaltreeResult};
use std::sync::Arc;

use super::contract::{InputRole, OperationContract, OperationName, OutputRole, Receiver};
use super::method::{ErasedMethod, ParamKind, ReturnKind, RoleValue};
use crate::schema::{AnyEntity, EntityHandle};

/* 📖 # Why resolve inputs through closures?

The same compiled operation is driven from two places: the path resolver, which knows
the parent entity and the path segment, and the request handler, which additionally
owns the request body and query string. Each caller hands over an Inputs map from role
to a resolver closure. Closures run lazily, so the payload is only decoded when a
method actually asks for it.
*/

/// A lazily evaluated input for one role.
pub type RoleResolver<'a> = Box<dyn Fn() -> HaltreeResult<RoleValue> + 'a>;

/// Maps input roles to resolvers. Roles without a resolver resolve to [`RoleValue::Absent`].
#[derive(Default)]
pub struct Inputs<'a> {
    resolvers: Vec<(InputRole, RoleResolver<'a>)>,
}

impl<'a> Inputs<'a> {
    pub fn new() -> Self {
        Self { resolvers: vec![] }
    }

    /// Register (or replace) the resolver for `role`.
    pub fn with(
        mut self,
        role: InputRole,
        resolver: impl Fn() -> HaltreeResult<RoleValue> + 'a,
    ) -> Self {
        self.resolvers.retain(|(existing, _)| *existing != role);
        self.resolvers.push((role, Box::new(resolver)));
        self
    }

    pub fn resolve(&self, role: InputRole) -> HaltreeResult<RoleValue> {
        match self.resolvers.iter().find(|(existing, _)| *existing == role) {
            Some((_, resolver)) => resolver(),
            None => Ok(RoleValue::Absent),
        }
    }
}

/// Result of invoking an operation.
pub struct Invocation {
    /// The receiver after the method ran.
    pub entity: AnyEntity,
    /// The OtherValue output (Page's id list), if the contract has one.
    pub other: Option<Vec<String>>,
}

/// A user method validated against its operation contract.
#[derive(Debug)]
pub struct CompiledOp {
    name: OperationName,
    receiver: Receiver,
    roles: Vec<InputRole>,
    input_kinds: Vec<ParamKind>,
    other_entity: Option<EntityHandle>,
    entity: EntityHandle,
    method: Arc<ErasedMethod>,
}

impl CompiledOp {
    /// Check `method` against `contract` for a node of type `entity` whose parent is `parent`.
    pub fn compile(
        contract: &OperationContract,
        method: Arc<ErasedMethod>,
        entity: EntityHandle,
        parent: Option<EntityHandle>,
    ) -> HaltreeResult<Self> {
        let name = contract.name();
        let method_error = |message: String| {
            Box::new(HaltreeError::compile(format!(
                "{}.{} {}",
                entity.name(),
                name,
                message
            )))
        };
        let signature = method.signature();
        let arity = signature.params.len();
        if arity < contract.min_inputs() || arity > contract.max_inputs() {
            let want = if contract.min_inputs() == contract.max_inputs() {
                format!("{} parameters", contract.min_inputs())
            } else {
                format!(
                    "{}-{} parameters, inclusive",
                    contract.min_inputs(),
                    contract.max_inputs()
                )
            };
            return Err(method_error(format!("got {} inputs; want {}", arity, want)));
        }

        let roles = contract.roles_for_arity(arity);
        let mut other_entity = None;
        for (position, (role, kind)) in roles.iter().zip(&signature.params).enumerate() {
            match (role, kind) {
                (InputRole::Id, ParamKind::Str) => {}
                (InputRole::PageNumber, ParamKind::Int) => {}
                (InputRole::Parent, ParamKind::Parent(handle)) if Some(*handle) == parent => {}
                (InputRole::Parent, _) if parent.is_none() => {}
                (InputRole::Payload, ParamKind::Payload(handle)) => {
                    other_entity = Some(*handle);
                }
                (role, actual) => {
                    let expected = match (role, parent) {
                        (InputRole::Id, _) => "String".to_string(),
                        (InputRole::PageNumber, _) => "an integer".to_string(),
                        (InputRole::Parent, Some(parent)) => format!("Parent<{}>", parent.name()),
                        (InputRole::Parent, None) => "any parent".to_string(),
                        (InputRole::Payload, _) => "Payload<T>".to_string(),
                    };
                    return Err(method_error(format!(
                        "cannot accept {} as its {} input at position {}; expected {}",
                        actual, role, position, expected
                    )));
                }
            }
        }

        let expected_return = match contract.output_roles() {
            [OutputRole::Error] => ReturnKind::Unit,
            [OutputRole::OtherValue, OutputRole::Error] => ReturnKind::Ids,
            other => {
                return Err(method_error(format!(
                    "has an unsupported output shape {:?}",
                    other
                )));
            }
        };
        if signature.returns != expected_return {
            return Err(method_error(format!(
                "must return {}, but returns {}",
                expected_return, signature.returns
            )));
        }

        Ok(Self {
            name,
            receiver: contract.receiver(),
            input_kinds: signature.params.clone(),
            roles,
            other_entity,
            entity,
            method,
        })
    }

    pub fn name(&self) -> OperationName {
        self.name
    }

    pub fn receiver(&self) -> Receiver {
        self.receiver
    }

    /// Roles bound to the method's parameters, in order.
    pub fn roles(&self) -> &[InputRole] {
        &self.roles
    }

    pub fn input_kinds(&self) -> &[ParamKind] {
        &self.input_kinds
    }

    /// Type the payload input decodes into, when the method takes one.
    pub fn other_entity(&self) -> Option<EntityHandle> {
        self.other_entity
    }

    /// Decode the payload into the node's own entity type (Payload receivers).
    pub fn payload_receiver(&self, inputs: &Inputs) -> HaltreeResult<AnyEntity> {
        match inputs.resolve(InputRole::Payload)? {
            RoleValue::Json(json) => self.entity.decode(json),
            RoleValue::Payload(entity) => Ok(entity),
            RoleValue::Absent => Err(Box::new(HaltreeError::decode(format!(
                "{}.{} requires a request body",
                self.entity.name(),
                self.name
            )))),
            other => Err(Box::new(HaltreeError::message(format!(
                "{}.{} cannot use {:?} as its receiver",
                self.entity.name(),
                self.name,
                other
            )))),
        }
    }

    /// Resolve every bound role and call the method on `receiver`.
    pub fn call(&self, mut receiver: AnyEntity, inputs: &Inputs) -> HaltreeResult<Invocation> {
        let mut args = Vec::with_capacity(self.roles.len());
        for role in &self.roles {
            let value = match (role, inputs.resolve(*role)?, self.other_entity) {
                (InputRole::Payload, RoleValue::Json(json), Some(other)) => {
                    RoleValue::Payload(other.decode(json)?)
                }
                (_, value, _) => value,
            };
            args.push(value);
        }
        let other = self.method.call(receiver.as_mut(), args)?;
        Ok(Invocation {
            entity: receiver,
            other,
        })
    }
}
