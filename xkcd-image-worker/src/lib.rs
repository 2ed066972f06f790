pub mod processor;
pub mod worker;

pub use processor::{ImageProcessor, ProcessError, ProcessedPaths};
pub use worker::{ImageWorker, Outcome};
