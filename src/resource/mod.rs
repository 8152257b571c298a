//! Resource type catalog
//!
//! Resource types are defined in JSON files under `src/resources/` and served
//! by provider describers, so a new resource type needs a definition entry
//! and a dispatch arm.
//!
//! # Architecture
//!
//! - [`registry`] - Loads and caches resource definitions from embedded JSON
//! - [`dispatch`] - Maps registry method names to provider describers
//!
//! # Example
//!
//! ```ignore
//! use describer::resource::describe;
//!
//! async fn list_repos(clients: &Clients, collector: &Collector) -> anyhow::Result<Vec<Resource>> {
//!     describe("scm-repositories", clients, collector, None, None).await
//! }
//! ```

pub mod dispatch;
mod registry;

pub use dispatch::{describe, describe_single};
pub use registry::*;
