//! Operation contracts, typed lifecycle methods and their compiled, invocable form.

mod compiled;
mod contract;
mod method;

pub use compiled::{CompiledOp, Inputs, Invocation, RoleResolver};
pub use contract::{
    InputRole, OperationContract, OperationName, OperationRegistry, OutputRole, Receiver,
    Requirement,
};
pub use method::{
    ErasedMethod, IntoMethodOutput, Method, MethodSignature, Param, ParamKind, Parent, Payload,
    ReturnKind, RoleValue,
};
