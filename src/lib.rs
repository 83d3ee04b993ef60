pub mod block;
pub mod error;
pub mod evaluator;
pub mod exec;
pub mod ops;
pub mod scanner;
pub mod scope;
pub mod token;
pub mod value;
