use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use haltree_base::{HaltreeError, HaltreeResult, ResultExt};
use tracing::{debug, info};

use super::descriptor::{Entity, EntityDescriptor, EntityHandle, Shape, TypeRef};
use super::node::{Member, Node, Schema};
use super::tag::RelationshipTag;
use crate::ops::{CompiledOp, OperationName, OperationRegistry, Receiver};

/* 📖 # Why compile the whole tree at start-up?

Every relationship directive and every lifecycle method signature is checked before the
first request is served. A typo in a directive, a Manifest method asking for the wrong
parent type or a missing Page method all stop the process with a compile error naming
the type and method, rather than turning into a 500 on some rarely visited path.

Each entity type is described once. Descriptors are cached by TypeId, while nodes are
built per position because the parent type (and with it the validity of Parent inputs)
depends on where a type appears.
*/

/// Builds a [`Schema`] from a root entity type.
pub struct SchemaCompiler {
    registry: OperationRegistry,
    descriptors: HashMap<TypeId, Arc<EntityDescriptor>>,
    types: Vec<&'static str>,
    stack: Vec<EntityHandle>,
}

impl SchemaCompiler {
    pub fn new(registry: OperationRegistry) -> Self {
        Self {
            registry,
            descriptors: HashMap::new(),
            types: vec![],
            stack: vec![],
        }
    }

    /// Compile the tree rooted at `R`.
    pub fn compile<R: Entity>(mut self) -> HaltreeResult<Schema> {
        let root = self.compile_node(
            EntityHandle::of::<R>(),
            None,
            Arc::new(RelationshipTag::root()),
        )?;
        info!(
            root = root.type_name(),
            types = self.types.len(),
            "compiled resource tree"
        );
        Ok(Schema {
            root,
            types: self.types,
        })
    }

    fn descriptor(&mut self, handle: EntityHandle) -> HaltreeResult<Arc<EntityDescriptor>> {
        if let Some(descriptor) = self.descriptors.get(&handle.type_id()) {
            return Ok(Arc::clone(descriptor));
        }
        let descriptor = Arc::new(handle.describe()?);
        self.descriptors
            .insert(handle.type_id(), Arc::clone(&descriptor));
        self.types.push(handle.name());
        Ok(descriptor)
    }

    fn compile_node(
        &mut self,
        handle: EntityHandle,
        parent: Option<EntityHandle>,
        tag: Arc<RelationshipTag>,
    ) -> HaltreeResult<Arc<Node>> {
        if self.stack.contains(&handle) {
            let cycle: Vec<&str> = self
                .stack
                .iter()
                .map(|h| h.name())
                .chain(std::iter::once(handle.name()))
                .collect();
            return Err(Box::new(HaltreeError::compile(format!(
                "relationship cycle: {}",
                cycle.join(" -> ")
            ))));
        }
        self.stack.push(handle);
        let result = self.build_node(handle, parent, tag);
        self.stack.pop();
        result
    }

    fn build_node(
        &mut self,
        handle: EntityHandle,
        parent: Option<EntityHandle>,
        tag: Arc<RelationshipTag>,
    ) -> HaltreeResult<Arc<Node>> {
        let descriptor = self.descriptor(handle)?;
        let is_collection = match descriptor.shape() {
            Shape::Record(_) => false,
            Shape::KeyedCollection { key, .. } => {
                if !key.is_string {
                    return Err(Box::new(HaltreeError::compile(format!(
                        "{}: only string-keyed collections supported, found key type {}",
                        handle.name(),
                        key.name
                    ))));
                }
                true
            }
            Shape::Sequence { .. } => {
                return Err(Box::new(HaltreeError::compile(format!(
                    "{}: sequences are not navigable; use a record or a string-keyed collection",
                    handle.name()
                ))));
            }
        };

        let ops = self.compile_ops(&descriptor, parent, is_collection)?;

        let mut members: Vec<Member> = vec![];
        let mut element = None;
        match descriptor.shape() {
            Shape::Record(fields) => {
                for field in fields {
                    let target = match field.target {
                        TypeRef::Indirect(target) => target,
                        other => {
                            return Err(Box::new(HaltreeError::compile(format!(
                                "{}.{} is {}, should be Option<{}> because it carries relationship directives",
                                handle.name(),
                                field.name,
                                other,
                                other
                            ))));
                        }
                    };
                    let rel = self.descriptor(target)?.rel().to_string();
                    let child_tag = Arc::new(
                        RelationshipTag::parse(&rel, &field.directives)
                            .with_context(|| format!("{}.{}", handle.name(), field.name))?,
                    );
                    let url_name = field.name.to_lowercase();
                    if members.iter().any(|m| m.url_name == url_name) {
                        return Err(Box::new(HaltreeError::compile(format!(
                            "{} declares more than one member named '{}'",
                            handle.name(),
                            url_name
                        ))));
                    }
                    let node = self.compile_node(target, Some(handle), Arc::clone(&child_tag))?;
                    members.push(Member {
                        name: field.name.clone(),
                        url_name,
                        node,
                        tag: child_tag,
                    });
                }
            }
            Shape::KeyedCollection {
                element: element_type,
                ..
            } => {
                let node = self.compile_node(*element_type, Some(handle), Arc::clone(&tag))?;
                element = Some(Member {
                    name: element_type.name().to_string(),
                    url_name: element_type.name().to_lowercase(),
                    node,
                    tag: Arc::clone(&tag),
                });
            }
            Shape::Sequence { .. } => {}
        }

        debug!(
            entity = handle.name(),
            collection = is_collection,
            members = members.len(),
            "compiled node"
        );
        Ok(Arc::new(Node {
            entity: handle,
            parent,
            is_collection,
            tag,
            members,
            element,
            ops,
        }))
    }

    fn compile_ops(
        &self,
        descriptor: &EntityDescriptor,
        parent: Option<EntityHandle>,
        is_collection: bool,
    ) -> HaltreeResult<Vec<CompiledOp>> {
        let mut ops = vec![];
        for contract in self.registry.contracts() {
            match descriptor.method(contract.name()) {
                Some(method) => ops.push(CompiledOp::compile(
                    contract,
                    Arc::clone(method),
                    descriptor.handle(),
                    parent,
                )?),
                None if contract.is_required(is_collection) => {
                    return Err(Box::new(HaltreeError::compile(format!(
                        "{} requires {} method",
                        descriptor.name(),
                        contract.name()
                    ))));
                }
                None => {}
            }
        }
        let has_manifest = ops.iter().any(|op| op.name() == OperationName::Manifest);
        for op in &ops {
            if op.receiver() != Receiver::Manifested {
                continue;
            }
            if op.name() == OperationName::Manifest || !has_manifest {
                return Err(Box::new(HaltreeError::compile(format!(
                    "{}.{} needs a manifested receiver, which requires a separate Manifest method",
                    descriptor.name(),
                    op.name()
                ))));
            }
        }
        Ok(ops)
    }
}

impl Schema {
    /// Compile `R` against the built-in Manifest, Page and Write contracts.
    pub fn compile<R: Entity>() -> HaltreeResult<Self> {
        SchemaCompiler::new(OperationRegistry::builtin()).compile::<R>()
    }
}
