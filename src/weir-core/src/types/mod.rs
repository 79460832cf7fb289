//! Record model for Weir pipelines.
//!
//! A record travelling between elements is a [`TupleEntry`]: a positional
//! [`Tuple`] of [`Value`]s tagged with the [`Fields`] naming each position.

mod fields;
mod tuple;
mod value;

pub use fields::Fields;
pub use tuple::{Tuple, TupleEntry};
pub use value::Value;
