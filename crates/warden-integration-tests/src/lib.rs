//! Integration test crate for Warden.
//!
//! This crate has no library code; it only contains integration tests
//! that exercise end-to-end flows across the workspace crates against
//! both ledger backends.
//!
//! ```sh
//! cargo test -p warden-integration-tests
//! ```
