//! Declarative HAL resource trees.
//!
//! A root entity type describes its relationships once; the [`schema`] module compiles
//! them into a node tree, [`resolve`] walks request paths through that tree by calling
//! the entities' lifecycle methods, and [`render`] turns the result into a HAL document.

pub mod api;
pub mod config;
pub mod execute;
pub mod ops;
pub mod render;
pub mod resolve;
pub mod schema;

mod scenario_tests;
#[cfg(test)]
mod test_fixtures;

pub use api::{HAL_CONTENT_TYPE, HalService};
pub use config::{Config, load_config, load_config_or_default};
pub use execute::{Executed, Reply, RequestContext, execute, respond};
pub use ops::{OperationContract, OperationName, OperationRegistry, Parent, Payload};
pub use render::{FieldSelector, RenderedValue, Resource, render_hal};
pub use resolve::{LocateOptions, Manifested, ResolvedNode};
pub use schema::{Entity, Schema, SchemaCompiler, TypeBuilder, TypeRef};
