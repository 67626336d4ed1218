//! Common test utilities for scenario testing.
//!
//! - [`fakes`] - in-memory origin server, gateway proxy and token source
//! - [`fixtures`] - fixture directories and gateway-shaped AuditEvents

#![allow(dead_code)]

pub mod fakes;
pub mod fixtures;
