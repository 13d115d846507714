pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod health;
pub mod proxy;
pub mod resolve;
pub mod session;
pub mod shutdown;
pub mod slurm;
pub mod submit;
pub mod worker;
