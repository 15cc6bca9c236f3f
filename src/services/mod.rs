//! Services: the coordination kernel's public operations.

pub mod beads;
pub mod event_store;
pub mod memory;
pub mod messaging;
pub mod projections;
pub mod replay;
pub mod reservations;

pub use beads::BeadService;
pub use event_store::{EventFilter, EventStore};
pub use memory::MemoryService;
pub use messaging::MessagingService;
pub use replay::ReplayService;
pub use reservations::ReservationService;
