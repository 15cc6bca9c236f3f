//! Domain layer: models, ports, and errors shared by every subsystem.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{CoreError, CoreResult, ErrorKind};
