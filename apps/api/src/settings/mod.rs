// Platform-wide settings: encrypted provider keys and the admin config surface.

pub mod handlers;
pub mod secrets;
pub mod store;
