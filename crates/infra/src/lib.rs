pub mod config;
pub mod intercom;
pub mod logging;
pub mod slack;
pub mod store;
