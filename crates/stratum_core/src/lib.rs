//! stratum Core Types
//!
//! Pure types with no I/O: identifiers, policy codes, actors and the
//! clock abstraction every lifecycle call receives its timestamp from.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod actor;
pub mod code;
pub mod error;
pub mod id;
pub mod time;

// Re-exports
pub use actor::{Actor, CallerContext, ContextProvider, StaticContextProvider};
pub use code::{ActionCode, FeatureCode, PolicyCode};
pub use error::{CoreError, CoreResult};
pub use id::{AuditId, RootId};
pub use time::{Clock, ManualClock, SystemClock, Timestamp};
