pub mod expr;
pub mod filter;
pub mod matcher;
pub mod parser;

pub use expr::QueryExpr;
pub use filter::FilterState;
pub use matcher::{create_matcher, Matcher};
pub use parser::parse_query;
