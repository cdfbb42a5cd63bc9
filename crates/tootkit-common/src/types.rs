/// Opaque server identifiers
pub mod id;
pub mod resource;

pub use id::EntityId;
pub use resource::{Account, Notification, Resource, Status};
