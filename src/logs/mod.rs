// Logs module - Output routing for managed processes

mod router;
mod timefmt;

pub use router::{LogHandles, LogRouter, LogSink};
pub use timefmt::to_strftime;
