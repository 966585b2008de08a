//! Logging setup shared by the batch binaries.

/// Install the JSON stderr subscriber; `debug` lowers the default level.
///
/// Repeated calls keep the first subscriber.
pub fn init(debug: bool) {
    tracing::init(debug);
}

pub mod tracing;
