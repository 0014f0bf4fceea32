//! Request dispatch for the Getman API client.
//!
//! Decides what to send, when, and how to cancel it: manual sends, delayed
//! sends and interval repeats for one-shot requests, connect and disconnect
//! for event streams.

pub mod auth;
pub mod channel;
pub mod dispatch;
pub mod environment;
pub mod error;
pub mod http;
pub mod import_export;
pub mod logging;
pub mod notify;
pub mod plugins;
pub mod settings;
pub mod shortcuts;
pub mod storage;

pub use error::{DispatchError, Result};
