pub mod processor;
pub mod quality;
pub mod threat_hunting;

pub use processor::{Processor, SourceBoundSink, DEFAULT_AUTO_TRIGGER_THRESHOLD};
