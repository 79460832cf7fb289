//! Property-based tests for the record model.
