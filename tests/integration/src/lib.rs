//! Multi-node integration tests for the veilmesh protocol engine.
//!
//! These tests wire several engines over the in-memory transport hub and
//! drive packet delivery deterministically, covering the end-to-end
//! behaviors no single crate can: content convergence across nodes,
//! transfer recovery through relay peers, and firewall boundaries.

pub mod test_utils;

#[cfg(test)]
mod convergence_tests;

#[cfg(test)]
mod firewall_tests;

#[cfg(test)]
mod transfer_recovery_tests;
