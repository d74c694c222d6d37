pub mod archive;
pub mod config;
pub mod lineup;
pub mod platform;
pub mod protocol;
pub mod schedule;
pub mod state;
pub mod xmltv;
