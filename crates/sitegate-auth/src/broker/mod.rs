//! Third-party OAuth login.
//!
//! The broker carries a multi-step provider login through browser
//! redirects without server-side session affinity: its state rides inside
//! a SERVICE-principal, OUT_OF_BAND credential, which doubles as the
//! provider's CSRF `state` parameter.
//!
//! - [`state`] - the state document, allow-lists and client metadata
//! - [`provider`] - provider endpoints and the outbound HTTP client
//! - [`service`] - the request / response / action steps

pub mod provider;
pub mod service;
pub mod state;

pub use provider::{HttpProviderClient, Provider, ProviderClient, ProviderEndpoints, ProviderProfile};
pub use service::{ActionFailure, ActionKind, ActionOutcome, BrokerRequest, OAuthBroker};
pub use state::{BrokerState, LoginMeta, RegisterMeta};
