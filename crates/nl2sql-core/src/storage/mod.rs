pub mod results;
pub mod schema;
pub mod store;

pub use results::{ResultsSink, ResumeState};
pub use store::Store;
