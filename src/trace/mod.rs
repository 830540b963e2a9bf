//! Path probing module.
//!
//! This module provides the path side of the measurement:
//! - Platform trace tool dialects and their output parsers
//! - Bounded, deadline-limited trace execution
//! - SYN probing of hop addresses
//! - Censorship localization with hop geolocation

pub mod dialect;
pub mod localize;
pub mod probe;
pub mod syn;
pub mod types;

pub use dialect::{dialect_for_os, native_dialect, TraceCommand, TraceDialect};
pub use localize::Localizer;
pub use probe::{DestinationResolver, PathProber, SystemResolver, TraceOptions};
pub use syn::{SynProber, SynReply, TcpConnectProber};
pub use types::*;
