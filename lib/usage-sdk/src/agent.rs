pub mod batcher;
pub mod buffer;
pub mod builder;
pub mod recorder;
pub mod report;
pub mod sampling;
