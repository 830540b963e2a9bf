//! Configuration module.
//!
//! Loading of probe settings, the resolver directory and domain lists.

pub mod loader;
pub mod settings;

pub use loader::ConfigLoader;
pub use settings::{DnsSettings, GeoSettings, Settings, TraceSettings};
