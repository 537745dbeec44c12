pub mod config;
pub mod time;

pub use config::StewardConfig;
pub use time::{epoch_secs, parse_duration};
