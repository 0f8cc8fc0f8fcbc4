pub mod clock;
pub mod events;
pub mod http;
pub mod in_memory;
