//! Property-based tests for the hierarchy graph.
