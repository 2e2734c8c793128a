//! Unit tests for the message bus.

mod dispatch_tests;
mod message_tests;
