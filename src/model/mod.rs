pub mod buffer;
pub mod channel;
pub mod config;
pub mod cursor;
pub mod url_match;
