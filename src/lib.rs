//! Cloud resource describers
//!
//! Describers poll provider APIs, page through the results, map every raw
//! item to a normalized [`Resource`](describer::Resource) and either stream
//! it to a [`Sink`](describer::Sink) or return the whole listing.
//!
//! - [`describer`] - Provider-agnostic core: collector, sinks, pagination
//! - [`providers`] - Provider clients, mappers and describers
//! - [`resource`] - Resource type registry and dispatch
//! - [`config`] - Persistent configuration

pub mod config;
pub mod describer;
pub mod providers;
pub mod resource;
