//! Training metrics shared across the trigger-cell crates.

pub mod mean;
pub mod value;
pub mod writer;

pub use mean::Mean;
pub use value::{HistogramSummary, MetricValue};
pub use writer::{JsonlSummaryWriter, MemorySummaryWriter, SummaryEvent, SummaryWriter, WriterError};
