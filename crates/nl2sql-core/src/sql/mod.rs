pub mod extract;
pub mod guard;
pub mod lexer;

pub use extract::extract_sql;
pub use guard::check_read_only;
