//! Helpers for tests of the engine and of crates that build on it. Enabled by the `test_utils` feature.
pub mod fixtures;
pub mod prepare_env;
