//! Unit tests for the progress module.

mod aggregator_tests;
mod event_tests;
