//! Xdawn spatial filtering for evoked responses.
//!
//! ```text
//! fit            per-class filters/patterns from epochs (+ overlap regression)
//! transformer    array-level fit/transform, no class context
//! estimator      container-level fit/transform/apply keyed by event name
//! class_map      ordered event name → value mapping returned by the above
//! ```
pub mod class_map;
pub mod estimator;
pub mod fit;
pub mod transformer;

pub use class_map::ClassMap;
pub use estimator::{FittedXdawn, Xdawn};
pub use fit::{
    construct_signal_from_epochs, fit_xdawn, least_square_evoked, toeplitz_design, OverlapInfo,
    XdawnFit,
};
pub use transformer::{FittedTransformer, SpatialTransform, XdawnTransformer};
