//! Utility functions shared by the publisher and the consumer.
//!
//! - **URL validation**: shape checks for discovery and base URLs
//! - **Paths**: building publish-relative paths and absolute feed URLs
//!
//! # Examples
//!
//! ```
//! use gbfs_sync::util::{join_url, relative_feed_path};
//!
//! let rel = relative_feed_path("v1/system", Some("en"), "station_status.json");
//! assert_eq!(rel, "v1/system/en/station_status.json");
//! assert_eq!(
//!     join_url("https://example.com/", &rel),
//!     "https://example.com/v1/system/en/station_status.json"
//! );
//! ```

mod paths;
mod url_validator;

pub use paths::{join_url, relative_feed_path};
pub use url_validator::{validate_feed_url, UrlValidationError};
