pub mod config;
pub mod error;
pub mod exchange;
pub mod settings;
pub mod types;

pub use config::Config;
pub use error::{Error, ErrorKind, Result};
pub use exchange::ExchangeClient;
pub use settings::BotSettings;
pub use types::*;
