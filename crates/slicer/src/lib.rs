pub mod loops;
pub mod registry;
pub mod slicer;

pub use loops::*;
pub use registry::*;
pub use slicer::*;
