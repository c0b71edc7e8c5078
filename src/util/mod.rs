//! Utility functions for common operations.
//!
//! This module provides the outbound-request safety layer:
//!
//! - **URL validation**: scheme and syntax checks for user-supplied URLs
//! - **Network guard**: DNS-resolved host checks against blocked address
//!   ranges, preventing SSRF into loopback and internal networks
//!
//! # Examples
//!
//! ```
//! use fullfeed::util::{parse_feed_url, NetworkGuard};
//!
//! let url = parse_feed_url("example.com/feed.xml").unwrap();
//! assert_eq!(url.scheme(), "http");
//!
//! let guard = NetworkGuard::new();
//! assert!(guard.is_enabled());
//! ```

mod url_validator;

pub use url_validator::{
    guard_rejection, parse_feed_url, validate_url, IpRange, NetworkGuard, UrlValidationError,
    DEFAULT_BLOCKED_RANGES,
};
