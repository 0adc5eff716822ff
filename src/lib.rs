pub mod api;
pub mod blocks;
pub mod compactor;
pub mod config;
pub mod engine;
pub mod limits;
pub mod model;
pub mod observability;
pub mod store;
pub mod validate;
pub mod wire;
