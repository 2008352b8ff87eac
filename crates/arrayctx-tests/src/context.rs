//! Array-context contract tests that every backend must satisfy
