//! secnet echo client and server.

#![forbid(unsafe_code)]

pub mod echo;

pub use echo::{handle_connection, send_message, serve};
