//! HTTP protocol implementation.
//!
//! One request and one response per connection, then the connection is
//! closed.
//!
//! - **`session`**: the per-connection state machine
//! - **`parser`**: parses a request from a byte buffer
//! - **`request`**: request representation and ordered header fields
//! - **`response`**: response representation with builder pattern
//! - **`writer`**: serializes a response and writes it out
//!
//! # Session State Machine
//!
//! ```text
//!        ┌─────────────┐
//!        │   Reading   │ ← Wait for a complete request
//!        └──────┬──────┘
//!               │ Request parsed          (malformed / EOF / timeout ─┐)
//!               ▼                                                     │
//!        ┌─────────────┐                                              │
//!        │   Routing   │ ← Router::route, no I/O                      │
//!        └──────┬──────┘                                              │
//!               │ Response built                                      │
//!               ▼                                                     │
//!        ┌─────────────┐                                              │
//!        │   Writing   │ ← Flush every byte, resuming short writes    │
//!        └──────┬──────┘                                              │
//!               │ Flushed or failed                                   │
//!               ▼                                                     │
//!        ┌─────────────┐                                              │
//!        │   Closing   │ ← Half-close the send direction  ◄───────────┘
//!        └──────┬──────┘
//!               ▼
//!             Done
//! ```

pub mod request;
pub mod response;
pub mod parser;
pub mod session;
pub mod writer;
