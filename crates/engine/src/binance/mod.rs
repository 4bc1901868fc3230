pub mod rest;

pub use rest::{BinanceClient, LIVE_URL, TESTNET_URL};
