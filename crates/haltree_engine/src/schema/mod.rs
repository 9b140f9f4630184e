//! Entity descriptors, relationship tags and the compiled node tree.

mod compiler;
mod descriptor;
mod node;
mod tag;

pub use compiler::SchemaCompiler;
pub use descriptor::{
    AnyEntity, Entity, EntityDescriptor, EntityHandle, EntityRef, FieldDescriptor, KeyType,
    Shape, TypeBuilder, TypeRef,
};
pub use node::{Member, Node, Schema};
pub use tag::RelationshipTag;
