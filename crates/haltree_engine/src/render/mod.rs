//! Turning resolved nodes into HAL documents.

mod filter;
mod hal;
mod resource;
mod value;

pub use filter::FieldSelector;
pub use hal::render_hal;
pub use resource::{Link, Resource};
pub use value::{Record, RenderedValue};
