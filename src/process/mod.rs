// Process module - Spawning and observing managed child processes

mod handle;
mod memory;

pub use handle::{parse_signal, ExitKind, ProcessHandle};
pub use memory::MemorySampler;
