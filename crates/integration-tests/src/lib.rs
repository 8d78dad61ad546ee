//! End-to-end tests for the conduit gateway live in `tests/`
