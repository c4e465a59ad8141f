//! Shared pieces of the Vocaluxe history recorder: wire types, the HTTP
//! client for the Vocaluxe web server, the day-file history log and the
//! on-disk configuration.

pub mod client;
pub mod config;
pub mod history;
pub mod platform;
pub mod protocol;
