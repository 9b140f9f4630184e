/* 📖 # Why explicit type descriptors instead of derive macros?

The schema compiler needs to know which fields of an entity are navigable relations,
whether a type is a record or a keyed collection, and which lifecycle methods it offers.
Rust has no runtime reflection, so every entity describes itself once through a
TypeBuilder. The builder output (EntityDescriptor) is plain data; the compiler never
needs anything beyond it.

Entity values travel through the engine type-erased (`dyn Any`). The EntityHandle keeps
the monomorphized helpers (decode, zero, equality with zero, JSON conversion) as plain
function pointers, so erased values can still be created, compared and rendered.
*/

use std::any::{Any, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use haltree_base::{HaltreeError, HaltreeResult};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::ops::{ErasedMethod, Method, OperationName};

/// An owned, type-erased entity value.
pub type AnyEntity = Box<dyn Any + Send + Sync>;

/// A shared, type-erased entity value (manifested parents are handed out this way).
pub type EntityRef = Arc<dyn Any + Send + Sync>;

/// A type that can be placed in the resource tree.
///
/// `Default` is the zero value: a freshly allocated receiver, and the value that
/// signals "absent" when it comes back from Manifest.
pub trait Entity:
    Serialize + DeserializeOwned + Default + PartialEq + Send + Sync + 'static
{
    /// Declare relationship fields, collection shape and lifecycle methods.
    fn describe(ty: &mut TypeBuilder<Self>);
}

/// Copyable reference to an entity type together with its erased helpers.
#[derive(Clone, Copy)]
pub struct EntityHandle {
    type_id: TypeId,
    name: &'static str,
    build: fn() -> HaltreeResult<EntityDescriptor>,
    decode: fn(serde_json::Value) -> HaltreeResult<AnyEntity>,
    zero: fn() -> AnyEntity,
    is_zero: fn(&(dyn Any + Send + Sync)) -> bool,
    to_json: fn(&(dyn Any + Send + Sync)) -> HaltreeResult<serde_json::Value>,
}

impl EntityHandle {
    pub fn of<T: Entity>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: short_type_name::<T>(),
            build: EntityDescriptor::build::<T>,
            decode: decode_entity::<T>,
            zero: zero_entity::<T>,
            is_zero: is_zero_entity::<T>,
            to_json: entity_to_json::<T>,
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Unqualified type name, e.g. `Pool`.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Run the type's `describe` hook.
    pub fn describe(&self) -> HaltreeResult<EntityDescriptor> {
        (self.build)()
    }

    /// Decode a JSON document into a value of this type.
    pub fn decode(&self, value: serde_json::Value) -> HaltreeResult<AnyEntity> {
        (self.decode)(value)
    }

    /// A freshly allocated zero value.
    pub fn zero(&self) -> AnyEntity {
        (self.zero)()
    }

    /// True if `value` is of this type and equal to its zero value.
    pub fn is_zero(&self, value: &(dyn Any + Send + Sync)) -> bool {
        (self.is_zero)(value)
    }

    /// Serialize a value of this type to JSON.
    pub fn to_json(&self, value: &(dyn Any + Send + Sync)) -> HaltreeResult<serde_json::Value> {
        (self.to_json)(value)
    }
}

impl PartialEq for EntityHandle {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for EntityHandle {}

impl fmt::Debug for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityHandle({})", self.name)
    }
}

fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

fn decode_entity<T: Entity>(value: serde_json::Value) -> HaltreeResult<AnyEntity> {
    let entity: T = serde_json::from_value(value).map_err(|e| {
        HaltreeError::decode(format!(
            "request body does not match {}: {}",
            short_type_name::<T>(),
            e
        ))
    })?;
    Ok(Box::new(entity))
}

fn zero_entity<T: Entity>() -> AnyEntity {
    Box::new(T::default())
}

fn is_zero_entity<T: Entity>(value: &(dyn Any + Send + Sync)) -> bool {
    value
        .downcast_ref::<T>()
        .is_some_and(|entity| *entity == T::default())
}

fn entity_to_json<T: Entity>(value: &(dyn Any + Send + Sync)) -> HaltreeResult<serde_json::Value> {
    let entity = value.downcast_ref::<T>().ok_or_else(|| {
        HaltreeError::message(format!("expected a {} value", short_type_name::<T>()))
    })?;
    serde_json::to_value(entity).map_err(|e| {
        Box::new(HaltreeError::message(format!(
            "Unable to serialize {}: {}",
            short_type_name::<T>(),
            e
        )))
    })
}

/// The declared Rust shape of a relationship field.
#[derive(Debug, Clone, Copy)]
pub enum TypeRef {
    /// `Option<T>` (or another nullable holder) of an entity type. The only valid shape.
    Indirect(EntityHandle),
    /// The entity stored inline.
    Direct(EntityHandle),
    /// Something that is not an entity at all.
    Scalar(&'static str),
}

impl TypeRef {
    pub fn optional<T: Entity>() -> Self {
        Self::Indirect(EntityHandle::of::<T>())
    }

    pub fn direct<T: Entity>() -> Self {
        Self::Direct(EntityHandle::of::<T>())
    }

    pub fn scalar<T: ?Sized>() -> Self {
        Self::Scalar(short_type_name::<T>())
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Indirect(handle) => write!(f, "Option<{}>", handle.name()),
            TypeRef::Direct(handle) => write!(f, "{}", handle.name()),
            TypeRef::Scalar(name) => write!(f, "{}", name),
        }
    }
}

/// A relationship field declared on a record type.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub name: String,
    pub target: TypeRef,
    pub directives: String,
}

/// Key type of a keyed collection.
#[derive(Debug, Clone, Copy)]
pub struct KeyType {
    pub name: &'static str,
    pub is_string: bool,
}

/// Structural kind of an entity type.
#[derive(Debug, Clone)]
pub enum Shape {
    Record(Vec<FieldDescriptor>),
    KeyedCollection { key: KeyType, element: EntityHandle },
    Sequence { element: EntityHandle },
}

/// Everything the schema compiler knows about one entity type.
pub struct EntityDescriptor {
    handle: EntityHandle,
    rel: String,
    shape: Shape,
    methods: Vec<(OperationName, Arc<ErasedMethod>)>,
}

impl EntityDescriptor {
    /// Describe `T` by running its `describe` hook.
    pub fn build<T: Entity>() -> HaltreeResult<Self> {
        let mut builder = TypeBuilder::<T>::new();
        T::describe(&mut builder);
        builder.finish(EntityHandle::of::<T>())
    }

    pub fn handle(&self) -> EntityHandle {
        self.handle
    }

    pub fn name(&self) -> &'static str {
        self.handle.name()
    }

    /// Relation name used when this type is the target of a relationship.
    pub fn rel(&self) -> &str {
        &self.rel
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn method(&self, name: OperationName) -> Option<&Arc<ErasedMethod>> {
        self.methods
            .iter()
            .find(|(method_name, _)| *method_name == name)
            .map(|(_, method)| method)
    }
}

impl fmt::Debug for EntityDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityDescriptor")
            .field("name", &self.name())
            .field("rel", &self.rel)
            .field("shape", &self.shape)
            .field(
                "methods",
                &self.methods.iter().map(|(name, _)| name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Collects the declarations made by [`Entity::describe`].
///
/// Mistakes are recorded rather than panicking and surface as a compile error when
/// the schema is built.
pub struct TypeBuilder<E> {
    rel: Option<String>,
    shape: Option<Shape>,
    fields: Vec<FieldDescriptor>,
    methods: Vec<(OperationName, Arc<ErasedMethod>)>,
    problems: Vec<String>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> TypeBuilder<E> {
    fn new() -> Self {
        Self {
            rel: None,
            shape: None,
            fields: vec![],
            methods: vec![],
            problems: vec![],
            _entity: PhantomData,
        }
    }

    /// Override the relation name (defaults to the lower-cased type name).
    pub fn rel(&mut self, rel: impl Into<String>) -> &mut Self {
        self.rel = Some(rel.into());
        self
    }

    /// Declare a relationship field. Fields with empty directives are plain data and ignored.
    pub fn field(&mut self, name: &str, target: TypeRef, directives: &str) -> &mut Self {
        if self.shape.is_some() {
            self.problems
                .push(format!("field '{}' declared on a collection type", name));
        }
        if !directives.trim().is_empty() {
            self.fields.push(FieldDescriptor {
                name: name.to_string(),
                target,
                directives: directives.to_string(),
            });
        }
        self
    }

    /// Declare this type as a map from `K` to `V`.
    pub fn keyed_collection<K: 'static, V: Entity>(&mut self) -> &mut Self {
        let key = KeyType {
            name: short_type_name::<K>(),
            is_string: TypeId::of::<K>() == TypeId::of::<String>()
                || TypeId::of::<K>() == TypeId::of::<&'static str>(),
        };
        self.set_shape(Shape::KeyedCollection {
            key,
            element: EntityHandle::of::<V>(),
        })
    }

    /// Declare this type as an ordered sequence of `V`.
    pub fn sequence<V: Entity>(&mut self) -> &mut Self {
        self.set_shape(Shape::Sequence {
            element: EntityHandle::of::<V>(),
        })
    }

    /// Register a lifecycle method under the given operation name.
    pub fn method<Args: 'static, M: Method<E, Args>>(
        &mut self,
        name: OperationName,
        method: M,
    ) -> &mut Self {
        if self.methods.iter().any(|(existing, _)| *existing == name) {
            self.problems
                .push(format!("{} method declared more than once", name));
        }
        self.methods
            .push((name, Arc::new(ErasedMethod::new::<E, Args, M>(method))));
        self
    }

    pub fn manifest<Args: 'static, M: Method<E, Args>>(&mut self, method: M) -> &mut Self {
        self.method(OperationName::Manifest, method)
    }

    pub fn page<Args: 'static, M: Method<E, Args>>(&mut self, method: M) -> &mut Self {
        self.method(OperationName::Page, method)
    }

    pub fn write<Args: 'static, M: Method<E, Args>>(&mut self, method: M) -> &mut Self {
        self.method(OperationName::Write, method)
    }

    fn set_shape(&mut self, shape: Shape) -> &mut Self {
        if self.shape.is_some() {
            self.problems
                .push("collection shape declared more than once".to_string());
        }
        if !self.fields.is_empty() {
            self.problems
                .push("collection shape declared on a record with fields".to_string());
        }
        self.shape = Some(shape);
        self
    }

    fn finish(self, handle: EntityHandle) -> HaltreeResult<EntityDescriptor> {
        if !self.problems.is_empty() {
            return Err(Box::new(HaltreeError::compile(format!(
                "{}: {}",
                handle.name(),
                self.problems.join("; ")
            ))));
        }
        let shape = self.shape.unwrap_or(Shape::Record(self.fields));
        Ok(EntityDescriptor {
            handle,
            rel: self.rel.unwrap_or_else(|| handle.name().to_lowercase()),
            shape,
            methods: self.methods,
        })
    }
}
