pub mod types;
pub mod config;
pub mod error;
pub mod tank;
pub mod store;
pub mod links;