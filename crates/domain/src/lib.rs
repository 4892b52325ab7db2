pub mod error;
pub mod events;
pub mod mapping;
pub mod ports;
pub mod relay;
