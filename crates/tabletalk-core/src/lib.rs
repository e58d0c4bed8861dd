pub mod config;
pub mod error;
pub mod types;

pub use config::TabletalkConfig;
pub use error::{Result, TabletalkError};
pub use types::*;
