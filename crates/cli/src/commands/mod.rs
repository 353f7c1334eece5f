pub mod call;
pub mod config;
pub mod keys;
pub mod utils;

pub use call::{handle_call_command, CallArgs};
pub use config::{handle_config_command, ConfigCommands};
pub use keys::{handle_keys_command, KeysCommands};
