//! Traversal engine tests: mapping, multimapping, reduction, sharing
