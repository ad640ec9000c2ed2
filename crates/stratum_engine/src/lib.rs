//! stratum Engine
//!
//! Administrative writes go through [`VersionLifecycleService`]; runtime
//! reads go through [`PolicyEvaluator`], which only ever sees current,
//! active, published versions.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod evaluator;
pub mod lifecycle;
pub mod locks;

pub use evaluator::{Evaluation, NoMatchReason, PolicyEvaluator, PolicyMatch, PolicyQuery};
pub use lifecycle::{LifecycleConfig, VersionLifecycleService};
pub use locks::RootLocks;
