//! Unit tests for the limiter module.
