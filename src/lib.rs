pub mod error;
pub mod identifier;
pub mod rewriter;
pub mod schema;
pub mod typemap;
