//! Property-based tests for grant resolution.
