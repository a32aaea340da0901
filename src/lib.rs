pub mod catalog;
pub mod cli;
pub mod config;
pub mod package;
pub mod server;
pub mod storage;
