pub mod clock;
pub mod ids;

// Foundation crate: small, well-tested primitives only.
pub use clock::*;
pub use ids::*;
