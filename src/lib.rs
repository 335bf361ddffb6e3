//! Turnstile - Per-Key Admission Control
//!
//! This crate decides whether an actor, identified by a string key, may
//! perform an action right now and, if not, how long it has to wait. Two
//! independent policies are provided: a sliding-window log limiter and a
//! minimum-interval throttle. Both keep their per-key state in process memory
//! and share the [`ratelimit::AdmissionPolicy`] contract.

pub mod config;
pub mod error;
pub mod ratelimit;
pub mod simulation;
