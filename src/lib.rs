pub mod types;
pub mod error;
pub mod config;
pub mod encoding;
pub mod iproto;
pub mod client;
pub mod db;
pub mod adapter;

pub use types::*;
pub use error::{Error, Result};
pub use config::{load_properties, parse_properties, AdapterConfig, Properties};
pub use encoding::{decode_row, encode_row};
pub use client::Connection;
pub use db::Db;
pub use adapter::TarantoolAdapter;

/// Installs the stderr diagnostic subscriber used by the command line tools.
/// `RUST_LOG` overrides the default `info` level.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}
