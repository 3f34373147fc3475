//! Client-side live data for the collaboration suite.
//!
//! Every hook follows the same template: fetch once, render, then keep the
//! result in sync with a push channel until the view goes away. See
//! [`LiveQuery`] for the lifecycle and [`hooks`] for the concrete instances.

pub mod auth;
pub mod backend;
pub mod config;
pub mod executor;
pub mod hooks;
pub mod lifetime;
pub mod live_query;
pub mod mutation;
pub mod subscriber;
pub mod telemetry;
pub mod time;
pub mod view_state;

pub use auth::Session;
pub use backend::{Backend, ChangeFeed, RestBackend, SubscriptionId};
pub use config::Config;
pub use executor::{Channel, CountQuery, Fetch, ListQuery, Patch};
pub use lifetime::{Lifetime, LifetimeToken};
pub use live_query::{LiveQuery, SyncOptions};
pub use mutation::{MutationIssuer, MutationOutcome};
pub use subscriber::{SubscriptionHandle, SyncPolicy};
pub use view_state::{LoadingPolicy, ViewState, ViewStateReader};
