use std::fmt;
use std::fmt::Write as _;
use std::sync::Arc;

use haltree_base::{HaltreeError, HaltreeResult};
use tracing::trace;

use super::descriptor::EntityHandle;
use super::tag::RelationshipTag;
use crate::ops::{CompiledOp, Inputs, Invocation, OperationName, Receiver};

/// A compiled position in the resource tree.
///
/// Built once by the [`SchemaCompiler`](super::SchemaCompiler) and shared read-only by
/// every request.
pub struct Node {
    pub(crate) entity: EntityHandle,
    pub(crate) parent: Option<EntityHandle>,
    pub(crate) is_collection: bool,
    pub(crate) tag: Arc<RelationshipTag>,
    pub(crate) members: Vec<Member>,
    pub(crate) element: Option<Member>,
    pub(crate) ops: Vec<CompiledOp>,
}

/// A named relationship from a record node to a child node.
pub struct Member {
    pub(crate) name: String,
    pub(crate) url_name: String,
    pub(crate) node: Arc<Node>,
    pub(crate) tag: Arc<RelationshipTag>,
}

impl Member {
    /// The field name as declared on the entity.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The lower-cased name used as a path segment.
    pub fn url_name(&self) -> &str {
        &self.url_name
    }

    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    pub fn tag(&self) -> &Arc<RelationshipTag> {
        &self.tag
    }
}

impl Node {
    pub fn entity(&self) -> EntityHandle {
        self.entity
    }

    pub fn type_name(&self) -> &'static str {
        self.entity.name()
    }

    /// Entity type of the parent node, `None` for the root.
    pub fn parent_entity(&self) -> Option<EntityHandle> {
        self.parent
    }

    pub fn is_collection(&self) -> bool {
        self.is_collection
    }

    pub fn tag(&self) -> &Arc<RelationshipTag> {
        &self.tag
    }

    /// Named members of a record node, in declaration order.
    pub fn members(&self) -> &[Member] {
        &self.members
    }

    /// Case-insensitive member lookup.
    pub fn member(&self, id: &str) -> Option<&Member> {
        let wanted = id.to_lowercase();
        self.members.iter().find(|member| member.url_name == wanted)
    }

    /// The implicit element member of a collection node.
    pub fn element(&self) -> Option<&Member> {
        self.element.as_ref()
    }

    pub fn op(&self, name: OperationName) -> Option<&CompiledOp> {
        self.ops.iter().find(|op| op.name() == name)
    }

    pub fn supports(&self, name: OperationName) -> bool {
        self.op(name).is_some()
    }

    /// HTTP methods this node answers to.
    pub fn allowed_methods(&self) -> Vec<&'static str> {
        let mut methods = vec!["GET"];
        if self.supports(OperationName::Write) {
            methods.push("PUT");
        }
        methods
    }

    /// Bind a receiver according to the contract and run the named operation.
    pub fn invoke(&self, name: OperationName, inputs: &Inputs) -> HaltreeResult<Invocation> {
        let op = self.op(name).ok_or_else(|| {
            HaltreeError::message(format!("{} has no {} operation", self.type_name(), name))
        })?;
        let receiver = match op.receiver() {
            Receiver::Nil => self.entity.zero(),
            Receiver::Manifested => self.invoke(OperationName::Manifest, inputs)?.entity,
            Receiver::Payload => op.payload_receiver(inputs)?,
        };
        trace!(entity = self.type_name(), operation = %name, "invoking operation");
        op.call(receiver, inputs)
    }

    fn write_outline(&self, out: &mut String, label: &str, depth: usize) -> fmt::Result {
        let kind = if self.is_collection {
            "collection"
        } else {
            "singular"
        };
        write!(out, "{:indent$}{}: {} ({})", "", label, self.type_name(), kind, indent = depth * 2)?;
        if !self.tag.rel.is_empty() {
            write!(out, " [{}]", self.tag)?;
        }
        let ops: Vec<&str> = self.ops.iter().map(|op| op.name().as_str()).collect();
        if ops.is_empty() {
            writeln!(out, " ops: -")?;
        } else {
            writeln!(out, " ops: {}", ops.join(", "))?;
        }
        for member in &self.members {
            member.node.write_outline(out, &member.url_name, depth + 1)?;
        }
        if let Some(element) = &self.element {
            element.node.write_outline(out, "*", depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("entity", &self.type_name())
            .field("is_collection", &self.is_collection)
            .field("tag", &self.tag)
            .field(
                "members",
                &self.members.iter().map(|m| &m.url_name).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

/// A compiled resource tree.
#[derive(Debug, Clone)]
pub struct Schema {
    pub(crate) root: Arc<Node>,
    pub(crate) types: Vec<&'static str>,
}

impl Schema {
    pub fn root(&self) -> &Arc<Node> {
        &self.root
    }

    /// Distinct entity types described while compiling, in first-seen order.
    pub fn types(&self) -> &[&'static str] {
        &self.types
    }

    /// The node a path leads to, ignoring the live data along the way.
    pub fn node_at(&self, segments: &[&str]) -> Option<&Node> {
        let mut node: &Node = &self.root;
        for segment in segments.iter().filter(|s| !s.is_empty()) {
            node = if node.is_collection {
                &node.element()?.node
            } else {
                &node.member(segment)?.node
            };
        }
        Some(node)
    }

    /// Human readable rendering of the tree, one node per line.
    pub fn outline(&self) -> String {
        let mut out = String::new();
        // Writing to a String cannot fail
        let _ = self.root.write_outline(&mut out, "/", 0);
        out
    }
}
