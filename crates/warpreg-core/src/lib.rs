//! warpreg-core — shared configuration and address handling for WarpReg.
//!
//! The registry, prober and API crates all receive a [`RegistryConfig`]
//! value constructed once at startup; nothing in the workspace reads
//! configuration from ambient global state.

pub mod addr;
pub mod config;

pub use addr::{AddrError, is_valid_url, join_host_port, split_host_port, url_from_host_port};
pub use config::{
    ConfigError, HealthSettings, RegistryConfig, ServerConfig, StoreBackend, StoreConfig,
    parse_duration,
};
