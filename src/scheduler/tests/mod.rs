//! Unit tests for the scheduler module.

mod domain_tests;
mod registry_tests;
