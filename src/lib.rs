pub mod auth;
pub mod clients;
pub mod config;
pub mod deadletter;
pub mod error;
pub mod handlers;
pub mod health;
pub mod ingest;
pub mod meetings;
pub mod processors;
pub mod retry;
pub mod state;
pub mod types;
