//! Cross-crate integration tests for arrpool live in `tests/`.
