pub mod calc;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod ipc;
pub mod model;
pub mod reports;
pub mod services;
