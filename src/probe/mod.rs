//! Proxy verification
//!
//! This module provides the verification pipeline including:
//! - DNS, TCP, HTTP echo and browser fallback tiers
//! - The tiered prober chaining them with gating and escalation
//! - The scheduler running the prober over a candidate list
//! - Cancellation and progress reporting

pub mod browser;
pub mod cancel;
pub mod dns;
pub mod echo;
pub mod progress;
pub mod prober;
pub mod scheduler;
pub mod tcp;
pub mod tier;

pub use browser::{BrowserLauncher, BrowserSession, BrowserTier, ChromiumLauncher};
pub use cancel::CancelToken;
pub use dns::DnsTier;
pub use echo::{check_echo_services, EchoTier};
pub use progress::{ChannelProgress, Progress, ProgressSink, TracingProgress};
pub use prober::{TierRole, TieredProber, TieredProberBuilder};
pub use scheduler::Scheduler;
pub use tcp::TcpTier;
pub use tier::{ProbeTier, TierOutcome};
