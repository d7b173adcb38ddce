//! Shared constants for end-to-end tests

/// Admin token configured on every test server.
pub const ADMIN_TOKEN: &str = "test-admin-token";

/// Size of the seeded processed audio file. Several streaming chunks
/// worth, so range math is exercised across chunk boundaries.
pub const SEEDED_AUDIO_SIZE: usize = 300_000;

/// Duration reported by the stub transcoder for every upload.
pub const STUB_DURATION_SECONDS: u64 = 42;

pub const REQUEST_TIMEOUT_SECS: u64 = 10;
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 10;
