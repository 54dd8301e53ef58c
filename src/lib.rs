//! Gatekeeper - Request Admission Gateway
//!
//! This crate decides whether an incoming request to a resource API may
//! proceed. Each request passes a fixed-window rate limiter backed by a
//! shared counter store, then cookie credential verification, in a fixed
//! order. Mutating calls on owned resources are additionally checked
//! against the verified identity.

pub mod admission;
pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod ownership;
pub mod policy;
pub mod ratelimit;
