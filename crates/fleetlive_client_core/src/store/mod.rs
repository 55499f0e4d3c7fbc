//! State containers observed by UI code.
//!
//! Each store keeps its state inside a `tokio::sync::watch` sender; every
//! reducer is a single `send_modify`/`send_if_modified` call so observers only
//! ever see whole transactions.

pub mod chat;
pub mod telemetry;
