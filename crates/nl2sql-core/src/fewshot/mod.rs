pub mod pool;
pub mod prompt;
pub mod selector;

pub use pool::{default_pool, load_pool, SCHEMA_DESCRIPTION};
pub use prompt::{BuiltPrompt, PromptBuilder, TokenCounter};
pub use selector::ExampleSelector;
