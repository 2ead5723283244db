pub mod cli;
pub mod client;
pub mod config;
pub mod frame;
pub mod models;
pub mod relay;
pub mod server;
pub mod storage;
pub mod upstream;
