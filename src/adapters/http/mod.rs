//! HTTP surface: the durable stream endpoint.

pub mod stream;

pub use stream::{StreamConfig, StreamServer};
