/* 📖 # Why typed method parameters instead of a fixed trait per operation?

Entity methods pick the inputs they care about: `Pool::manifest(&mut self, pools:
Parent<Pools>, id: String)` wants its parent and id, `Root::manifest(&mut self)` wants
nothing. Every parameter type implements Param, which reports a ParamKind at
registration and converts a RoleValue at call time. The Method trait is implemented for
closures and fn items of up to three parameters, so the compiler can check a method's
signature against its operation contract without running it.
*/

use std::any::Any;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use haltree_base::{HaltreeError, HaltreeResult};

use crate::schema::{AnyEntity, Entity, EntityHandle, EntityRef};

/// A resolved input value handed to a method.
pub enum RoleValue {
    /// The resolver had nothing; parameters fall back to their zero value.
    Absent,
    Str(String),
    Int(i64),
    Entity(EntityRef),
    /// An undecoded request payload.
    Json(serde_json::Value),
    /// A decoded payload.
    Payload(AnyEntity),
}

impl fmt::Debug for RoleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoleValue::Absent => write!(f, "Absent"),
            RoleValue::Str(s) => write!(f, "Str({:?})", s),
            RoleValue::Int(i) => write!(f, "Int({})", i),
            RoleValue::Entity(_) => write!(f, "Entity(..)"),
            RoleValue::Json(v) => write!(f, "Json({})", v),
            RoleValue::Payload(_) => write!(f, "Payload(..)"),
        }
    }
}

/// The type constraint a parameter satisfies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Str,
    Int,
    Parent(EntityHandle),
    Payload(EntityHandle),
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamKind::Str => write!(f, "String"),
            ParamKind::Int => write!(f, "integer"),
            ParamKind::Parent(handle) => write!(f, "Parent<{}>", handle.name()),
            ParamKind::Payload(handle) => write!(f, "Payload<{}>", handle.name()),
        }
    }
}

/// A type usable as a method parameter.
pub trait Param: Sized + 'static {
    fn kind() -> ParamKind;
    fn from_role(value: RoleValue) -> HaltreeResult<Self>;
}

fn unexpected<T>(expected: ParamKind, value: &RoleValue) -> HaltreeResult<T> {
    Err(Box::new(HaltreeError::message(format!(
        "expected {} input, got {:?}",
        expected, value
    ))))
}

impl Param for String {
    fn kind() -> ParamKind {
        ParamKind::Str
    }

    fn from_role(value: RoleValue) -> HaltreeResult<Self> {
        match value {
            RoleValue::Absent => Ok(String::new()),
            RoleValue::Str(s) => Ok(s),
            RoleValue::Int(i) => Ok(i.to_string()),
            other => unexpected(Self::kind(), &other),
        }
    }
}

macro_rules! impl_int_param {
    ($($int:ty),*) => {
        $(
            impl Param for $int {
                fn kind() -> ParamKind {
                    ParamKind::Int
                }

                fn from_role(value: RoleValue) -> HaltreeResult<Self> {
                    let number = match value {
                        RoleValue::Absent => return Ok(0),
                        RoleValue::Int(i) => i,
                        RoleValue::Str(ref s) => s.parse::<i64>().map_err(|_| {
                            HaltreeError::decode(format!("'{}' is not an integer", s))
                        })?,
                        other => return unexpected(Self::kind(), &other),
                    };
                    <$int>::try_from(number).map_err(|_| {
                        Box::new(HaltreeError::decode(format!(
                            "{} is out of range for {}",
                            number,
                            stringify!($int)
                        )))
                    })
                }
            }
        )*
    };
}

impl_int_param!(i32, i64, u32, u64, usize);

/// The manifested entity of the parent node.
#[derive(Debug, Clone)]
pub struct Parent<T>(pub Arc<T>);

impl<T> Deref for Parent<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: Entity> Param for Parent<T> {
    fn kind() -> ParamKind {
        ParamKind::Parent(EntityHandle::of::<T>())
    }

    fn from_role(value: RoleValue) -> HaltreeResult<Self> {
        match value {
            RoleValue::Absent => Ok(Parent(Arc::new(T::default()))),
            RoleValue::Entity(entity) => entity.downcast::<T>().map(Parent).map_err(|_| {
                Box::new(HaltreeError::message(format!(
                    "parent is not a {}",
                    EntityHandle::of::<T>().name()
                )))
            }),
            other => unexpected(Self::kind(), &other),
        }
    }
}

/// A request payload decoded into `T`.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload<T>(pub T);

impl<T> Payload<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Deref for Payload<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: Entity> Param for Payload<T> {
    fn kind() -> ParamKind {
        ParamKind::Payload(EntityHandle::of::<T>())
    }

    fn from_role(value: RoleValue) -> HaltreeResult<Self> {
        match value {
            RoleValue::Absent => Ok(Payload(T::default())),
            RoleValue::Payload(entity) => entity
                .downcast::<T>()
                .map(|entity| Payload(*entity))
                .map_err(|_| {
                    Box::new(HaltreeError::message(format!(
                        "payload is not a {}",
                        EntityHandle::of::<T>().name()
                    )))
                }),
            RoleValue::Json(json) => {
                let entity = EntityHandle::of::<T>().decode(json)?;
                Self::from_role(RoleValue::Payload(entity))
            }
            other => unexpected(Self::kind(), &other),
        }
    }
}

/// The shape of a method's return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnKind {
    /// `HaltreeResult<()>`: an error output only.
    Unit,
    /// `HaltreeResult<Vec<String>>`: an id list plus an error output.
    Ids,
}

impl fmt::Display for ReturnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReturnKind::Unit => write!(f, "HaltreeResult<()>"),
            ReturnKind::Ids => write!(f, "HaltreeResult<Vec<String>>"),
        }
    }
}

/// A type usable as a method return value.
pub trait IntoMethodOutput {
    fn kind() -> ReturnKind;
    fn into_output(self) -> HaltreeResult<Option<Vec<String>>>;
}

impl IntoMethodOutput for HaltreeResult<()> {
    fn kind() -> ReturnKind {
        ReturnKind::Unit
    }

    fn into_output(self) -> HaltreeResult<Option<Vec<String>>> {
        self.map(|()| None)
    }
}

impl IntoMethodOutput for HaltreeResult<Vec<String>> {
    fn kind() -> ReturnKind {
        ReturnKind::Ids
    }

    fn into_output(self) -> HaltreeResult<Option<Vec<String>>> {
        self.map(Some)
    }
}

/// Parameter and return shapes of a registered method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSignature {
    pub params: Vec<ParamKind>,
    pub returns: ReturnKind,
}

/// A lifecycle method on entity `E`. `Args` is the tuple of parameter types.
pub trait Method<E, Args>: Send + Sync + 'static {
    fn signature(&self) -> MethodSignature;
    fn call(&self, receiver: &mut E, args: Vec<RoleValue>) -> HaltreeResult<Option<Vec<String>>>;
}

macro_rules! impl_method {
    ($($arg:ident),*) => {
        impl<E, F, R, $($arg,)*> Method<E, ($($arg,)*)> for F
        where
            E: Entity,
            F: Fn(&mut E, $($arg),*) -> R + Send + Sync + 'static,
            R: IntoMethodOutput,
            $($arg: Param,)*
        {
            fn signature(&self) -> MethodSignature {
                MethodSignature {
                    params: vec![$($arg::kind()),*],
                    returns: R::kind(),
                }
            }

            #[allow(non_snake_case, unused_mut, unused_variables)]
            fn call(&self, receiver: &mut E, args: Vec<RoleValue>) -> HaltreeResult<Option<Vec<String>>> {
                let mut args = args.into_iter();
                $(let $arg = $arg::from_role(args.next().unwrap_or(RoleValue::Absent))?;)*
                (self)(receiver, $($arg),*).into_output()
            }
        }
    };
}

impl_method!();
impl_method!(A1);
impl_method!(A1, A2);
impl_method!(A1, A2, A3);

type ErasedCall = dyn Fn(&mut (dyn Any + Send + Sync), Vec<RoleValue>) -> HaltreeResult<Option<Vec<String>>>
    + Send
    + Sync;

/// A method with its receiver type erased, as stored in the schema.
pub struct ErasedMethod {
    signature: MethodSignature,
    call: Box<ErasedCall>,
}

impl ErasedMethod {
    pub fn new<E: Entity, Args: 'static, M: Method<E, Args>>(method: M) -> Self {
        let signature = method.signature();
        Self {
            signature,
            call: Box::new(move |receiver, args| {
                let receiver = receiver.downcast_mut::<E>().ok_or_else(|| {
                    HaltreeError::message(format!(
                        "receiver is not a {}",
                        EntityHandle::of::<E>().name()
                    ))
                })?;
                method.call(receiver, args)
            }),
        }
    }

    pub fn signature(&self) -> &MethodSignature {
        &self.signature
    }

    /// Call the method on `receiver`, which must hold the entity type it was registered for.
    pub fn call(
        &self,
        receiver: &mut (dyn Any + Send + Sync),
        args: Vec<RoleValue>,
    ) -> HaltreeResult<Option<Vec<String>>> {
        (self.call)(receiver, args)
    }
}

impl fmt::Debug for ErasedMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErasedMethod")
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TypeBuilder;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Counter {
        total: i64,
        label: String,
    }

    impl Counter {
        fn bump(&mut self, by: i64, label: String) -> HaltreeResult<()> {
            self.total += by;
            self.label = label;
            Ok(())
        }

        fn ids(&mut self, parent: Parent<Counter>) -> HaltreeResult<Vec<String>> {
            Ok(vec![parent.label.clone(), self.label.clone()])
        }
    }

    impl Entity for Counter {
        fn describe(ty: &mut TypeBuilder<Self>) {
            ty.manifest(Counter::bump);
        }
    }

    #[test]
    fn test_signature_of_fn_items() {
        let bump = ErasedMethod::new::<Counter, _, _>(Counter::bump);
        assert_eq!(
            bump.signature(),
            &MethodSignature {
                params: vec![ParamKind::Int, ParamKind::Str],
                returns: ReturnKind::Unit,
            }
        );

        let ids = ErasedMethod::new::<Counter, _, _>(Counter::ids);
        assert_eq!(
            ids.signature().params,
            [ParamKind::Parent(EntityHandle::of::<Counter>())]
        );
        assert_eq!(ids.signature().returns, ReturnKind::Ids);
    }

    #[test]
    fn test_call_with_absent_inputs_uses_zero_values() {
        let bump = ErasedMethod::new::<Counter, _, _>(Counter::bump);
        let mut counter = Counter::default();
        let out = bump.call(&mut counter, vec![RoleValue::Int(3)]).unwrap();
        assert_eq!(out, None);
        assert_eq!(counter.total, 3);
        assert_eq!(counter.label, "");
    }

    #[test]
    fn test_call_with_parent_entity() {
        let ids = ErasedMethod::new::<Counter, _, _>(Counter::ids);
        let parent: EntityRef = Arc::new(Counter {
            total: 0,
            label: "parent".to_string(),
        });
        let mut counter = Counter {
            total: 0,
            label: "me".to_string(),
        };
        let out = ids.call(&mut counter, vec![RoleValue::Entity(parent)]).unwrap();
        assert_eq!(out, Some(vec!["parent".to_string(), "me".to_string()]));
    }

    #[test]
    fn test_call_with_wrong_receiver_fails() {
        let bump = ErasedMethod::new::<Counter, _, _>(Counter::bump);
        let mut not_a_counter = String::new();
        let err = bump.call(&mut not_a_counter, vec![]).unwrap_err();
        assert_eq!(err.to_string(), "receiver is not a Counter");
    }

    #[test]
    fn test_payload_param_decodes_json() {
        let payload = Payload::<Counter>::from_role(RoleValue::Json(
            serde_json::json!({"total": 7, "label": "x"}),
        ))
        .unwrap();
        assert_eq!(payload.total, 7);
        assert_eq!(payload.into_inner().label, "x");

        let err = Payload::<Counter>::from_role(RoleValue::Json(serde_json::json!([1])))
            .unwrap_err();
        assert_eq!(err.status_code(), Some(400));
    }

    #[test]
    fn test_int_param_conversions() {
        assert_eq!(i32::from_role(RoleValue::Str("12".to_string())).unwrap(), 12);
        assert_eq!(u32::from_role(RoleValue::Absent).unwrap(), 0);
        assert_eq!(
            u32::from_role(RoleValue::Int(-1)).unwrap_err().to_string(),
            "-1 is out of range for u32"
        );
        assert_eq!(
            i64::from_role(RoleValue::Str("x".to_string()))
                .unwrap_err()
                .to_string(),
            "'x' is not an integer"
        );
        assert_eq!(
            String::from_role(RoleValue::Int(4)).unwrap(),
            "4".to_string()
        );
    }

    #[test]
    fn test_param_kind_display() {
        assert_eq!(ParamKind::Str.to_string(), "String");
        assert_eq!(
            ParamKind::Parent(EntityHandle::of::<Counter>()).to_string(),
            "Parent<Counter>"
        );
        assert_eq!(ReturnKind::Ids.to_string(), "HaltreeResult<Vec<String>>");
    }
}
