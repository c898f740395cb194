pub mod cli;
pub mod config;
pub mod flood;
pub mod persistence;
pub mod server;
pub mod simulation;
