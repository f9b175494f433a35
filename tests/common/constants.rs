//! Shared constants for end-to-end tests
//!
//! When fixture data or credentials change, update only this file.

// ============================================================================
// Credentials
// ============================================================================

/// Token accepted by the test server
pub const API_TOKEN: &str = "test-token-123";

/// User the test token authenticates as
pub const API_USER: &str = "scanner";

/// Header carrying the request nonce of cookie sessions
pub const NONCE_HEADER: &str = "X-Scan-Nonce";

// ============================================================================
// Fixture records
// ============================================================================

/// Published posts seeded in the records database
pub const PUBLISHED_POSTS: usize = 12;

/// Published pages seeded in the records database
pub const PUBLISHED_PAGES: usize = 3;

/// Draft posts, never picked up by a scan
pub const DRAFT_POSTS: usize = 2;

/// Public record type with no records
pub const EMPTY_TYPE: &str = "product";

/// Registered but non-public record type
pub const PRIVATE_TYPE: &str = "revision";

// ============================================================================
// Timing
// ============================================================================

pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 50;

pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Upper bound for a deferred scan to drain through the dispatcher
pub const SCAN_COMPLETION_TIMEOUT_MS: u64 = 10_000;
