//! Per-broadcaster live sessions: registry, lifecycle, fan-out, and the
//! viewer-facing event stream.

pub mod buffer;
pub mod corroboration;
pub mod events;
pub mod fanout;
pub mod lifecycle;
pub mod registry;
pub mod server;
pub mod session;
pub mod worker;
