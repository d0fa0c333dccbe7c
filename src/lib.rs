pub mod artefacts;
pub mod cache;
pub mod challenge;
pub mod cleanup;
pub mod cli;
pub mod compose;
pub mod config;
pub mod env_check;
pub mod error;
pub mod features;
pub mod interface;
pub mod layout;
pub mod metrics;
pub mod results;
pub mod runner;
pub mod server;
pub mod storage;
pub mod token;
