pub mod board;
pub mod client;
pub mod config;
pub mod db;
pub mod model;
pub mod ops;
pub mod reconnect;
pub mod registry;
pub mod server;
pub mod sweep;
