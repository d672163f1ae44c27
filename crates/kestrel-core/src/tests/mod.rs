//! Test module for kestrel-core
//!
//! This module contains tests for:
//! - Query parsing and keyword tables, including property tests
//! - Plugin registry bookkeeping and trigger-keyword overrides
//! - Routing by keyword, OS support and disabled state
//! - Dispatch timeouts, failures, panics, cancellation and debounce
//! - Aggregation ordering, dedup, stale epochs and usage boost
//! - End-to-end launcher scenarios
//! - Configuration loading and defaults
//! - Manifest discovery and the stdio plugin host

// Test modules unwrap freely and cast small test counters
#![allow(clippy::cast_possible_truncation, clippy::missing_panics_doc)]

mod parser_tests;
