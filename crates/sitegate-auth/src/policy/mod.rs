//! Per-route access control.
//!
//! - [`route`] - the policy a route declares
//! - [`evaluator`] - the allow/deny decision for one request

pub mod evaluator;
pub mod route;

pub use evaluator::{AccessDecision, DenyReason, Evaluator, RequestSignals};
pub use route::{MatchMode, RequestSource, RoutePolicy};
