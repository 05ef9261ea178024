// Library crate for integration tests.
// main.rs has its own mod declarations; this re-exports all modules.

pub mod adapter;
pub mod config;
pub mod dashboard;
pub mod dispatcher;
pub mod error;
pub mod hierarchy;
pub mod model;
pub mod recorder;
pub mod routes;
pub mod server;
pub mod state;
pub mod store;
