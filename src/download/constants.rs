//! Constants for the download module (timeouts, chunking).

/// Default HTTP connect timeout (10 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default per-request timeout (30 seconds).
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Buffer size for streamed writes.
pub const WRITE_BUFFER_BYTES: usize = 8192;
