pub mod runner;

pub use runner::{ExperimentRun, ExperimentRunner, RunPolicy};
