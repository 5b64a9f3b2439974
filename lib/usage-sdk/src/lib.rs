pub mod agent;
pub mod circuit_breaker;
pub mod collector;
pub mod normalize;
pub mod processor;
pub mod schema;
pub mod sender;

pub use graphql_tools;
