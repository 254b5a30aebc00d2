#![doc = include_str!("../README.md")]

pub mod callback;
pub mod config;
pub mod conn;
pub mod error;
pub mod gateway;
pub mod lane;
pub mod middleware;
pub mod offline;
pub mod player;
pub mod process;
pub mod server;
pub mod session;
pub mod worker;

pub use config::{ProxyConfig, ServerConfig, StatusConfig};
pub use conn::{
    ConnId, HandshakeConn, ListenerFactory, McConn, ServerConnFactory, ServerConnFactoryBuilder,
};
pub use error::ProxyError;
pub use lane::{ConnectionGauge, ProxyLane, ProxyLaneConfig};
pub use server::{DefaultServerStore, ServerData, ServerStore, SingleServerStore};
