//! Error types and result aliases for Weir.
//!
//! Every crate in the workspace reports failures through [`WeirError`]. The
//! planner carries its own structured error and converts into this one at the
//! compile boundary.

mod error;

pub use error::{WeirError, WeirResult};
