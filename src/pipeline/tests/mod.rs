//! Unit tests for the job pipeline.

mod backend_tests;
mod domain_tests;
