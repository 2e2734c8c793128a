//! Adapters for the job pipeline ports.

mod closure;
mod memory;

pub use closure::FnJobHandler;
pub use memory::InMemoryQueueBackend;
