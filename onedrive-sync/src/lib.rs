pub mod auth;
pub mod cli;
pub mod config;
pub mod oauth_flow;
pub mod storage;
pub mod sync;
pub mod token_provider;
