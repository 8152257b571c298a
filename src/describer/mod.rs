//! Describer core
//!
//! Everything provider-agnostic lives here: the normalized [`Resource`], the
//! [`Sink`] contract, pagination helpers and the [`Collector`] that ties a
//! page fetcher and an item mapper together.
//!
//! # Example
//!
//! ```ignore
//! use describer::describer::{Collector, Submitter};
//!
//! async fn list(collector: &Collector) -> anyhow::Result<()> {
//!     let resources = collector
//!         .collect(|s: Submitter| async move { s.submit_all(fetch_items().await?, map_item).await }, None)
//!         .await?;
//!     println!("{} resources", resources.len());
//!     Ok(())
//! }
//! ```

pub mod collector;
pub mod error;
pub mod model;
pub mod paginate;
pub mod sink;

pub use collector::{describe_one, Collector, CollectorConfig, Submitter};
pub use error::DescribeError;
pub use model::{Description, Resource};
pub use paginate::{paginate, sample_first, Page, PagePolicy, PageToken};
pub use sink::{ChannelSink, FnSink, JsonLinesSink, Sink};
