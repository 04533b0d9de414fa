pub mod constants;
pub mod time_utils;

pub use constants::*;
pub use time_utils::{format_display_time, format_timestamp};
