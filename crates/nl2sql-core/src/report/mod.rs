pub mod analysis;
pub mod console;
pub mod summary;

pub use summary::{summarize, write_summary, Aggregate, RunSummary};
