//! Client side of cachet.
//!
//! This crate provides the secondary fetch client, the observation event
//! types, the validation and fetch pipeline, and the accounting and
//! interception controller shared by the server.

pub mod context;
pub mod controller;
pub mod events;
pub mod fetch;
pub mod pipeline;

pub use context::CacheContext;
pub use controller::{
    Controller, EventOutcome, GlobalStats, LocalRuleTable, RequestOutcome, ResponseOutcome, RuleInstaller, ServeRule,
    ServedAsset, SiteState,
};
pub use events::{ObservedEvent, RequestObserved, ResponseObserved, Target};
pub use fetch::{BodyFetcher, FetchClient, FetchConfig, FetchedBody};
pub use pipeline::{Pipeline, PipelineOutcome, SkipReason};
