pub mod auth;
pub mod calendar;
pub mod clock;
pub mod command;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod gateway;
pub mod limits;
pub mod model;
pub mod observability;
pub mod queue;
pub mod render;
pub mod repo;
pub mod session;
pub mod sweeper;
pub mod transport;
pub mod wal;
