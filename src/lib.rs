//! Proxyrank - proxy verification and ranking
//!
//! Probes candidate HTTP(S) proxies through a chain of verification tiers
//! and hands back a latency-ranked list for session rotation.
//!
//! ## Features
//!
//! - DNS and TCP gating before any HTTP traffic
//! - IP echo verification through the proxy, with ordered service failover
//! - Headless browser fallback when every echo service fails
//! - Sequential or bounded-concurrent staggered dispatch with a global deadline
//! - Cooperative cancellation that keeps completed results
//! - Fastest-first, round-robin and top-k random session rotation

pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod probe;
pub mod ranking;
pub mod rotation;

pub use config::Config;
pub use error::{ErrorKind, RankerError, Result};
pub use pipeline::{Pipeline, SessionPlan, VerificationReport};
pub use probe::CancelToken;
