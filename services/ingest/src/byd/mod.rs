pub mod client;
pub mod models;
pub mod normalize;
pub mod query;
pub mod sync;
