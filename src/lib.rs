//! Cluster Broadcast Node Library
//!
//! This library crate implements one node's share of a cluster-wide
//! best-effort broadcast: values submitted to any node eventually show up in
//! every node's `read` answer, despite an unreliable point-to-point RPC
//! substrate (messages may be dropped or delayed, never corrupted).
//!
//! ## Architecture Modules
//! The crate is split into two subsystems:
//!
//! - **`broadcast`**: The dissemination engine. Deduplicated value
//!   observation, the retrying RPC wrapper, the periodic batch flush with its
//!   one-level coordinator hierarchy, and the request handlers (`read`,
//!   `broadcast`, `topology`, internal `yap`).
//! - **`transport`**: The messaging seam the engine consumes. Defines the
//!   `Transport` trait (identity, member list, fire-and-forget send, timed
//!   request/response call) and an in-process implementation that routes
//!   between co-located nodes through channels, with link fault injection
//!   for tests and simulations.

pub mod broadcast;
pub mod transport;
