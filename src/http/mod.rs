//! # HTTP
//!
//! Request and response models, URL composition and the reqwest backend.

pub mod client;
pub mod method;
pub mod request;
pub mod response;
pub mod url;
