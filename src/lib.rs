//! # berth
//!
//! Keeps the network identity of containerized local-dev projects
//! consistent: dynamically allocated host ports, human-readable DNS names
//! and reverse-proxy routes that always agree, even though they are enforced
//! by three independently-operated external systems (the container runtime,
//! a DNS forwarder and an HTTP reverse proxy).
//!
//! ## Quick start
//!
//! ```no_run
//! use berth::config::ProjectConfig;
//! use berth::context::NetContext;
//! use berth::{dns, identity, proxy};
//!
//! # async fn example() -> Result<(), berth::Error> {
//! let ctx = NetContext::new("test")?;
//! let config: ProjectConfig =
//!     serde_yaml::from_str("project: shop\nservices:\n  web:\n    ports: [80]\n")?;
//!
//! let specs = config.service_specs();
//! let allocation = ctx.ledger().allocate(&config.project, &specs)?;
//! let identity = identity::derive(&config.project, &specs, &ctx.tld);
//!
//! let mappings = proxy::build_mappings(&identity, &specs, &allocation);
//! proxy::ProxyReconciler::new(&ctx).install(&config.project, &mappings).await?;
//! dns::DnsReconciler::new(&ctx).install(&config.project, &identity.domains()).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Consistency model
//!
//! Reconciliation is best-effort and idempotent with bounded retries: a
//! failed proxy or DNS reload leaves the desired state on disk and the next
//! successful reload converges. There are no transactions across the three
//! external systems, and no cross-process locking on the persisted state.

pub mod certs;
pub mod cli;
pub mod commands;
pub mod config;
pub mod context;
pub mod dns;
pub mod docker;
pub mod error;
pub mod fsio;
pub mod gitinfo;
pub mod health;
pub mod identity;
pub mod ledger;
pub mod output;
pub mod proxy;
pub mod retry;
pub mod runner;

// Re-export commonly used types
pub use context::NetContext;
pub use dns::{DnsBackend, DnsReconciler};
pub use error::{Error, Result};
pub use health::{HealthAggregator, OverallStatus, ProjectStatus};
pub use identity::{ProjectNetworkIdentity, ServiceRole, ServiceSpec};
pub use ledger::PortLedger;
pub use proxy::{ProxyReconciler, ServiceMapping};
pub use retry::RetryPolicy;
pub use runner::{ProcessRunner, ScriptedRunner, SystemRunner};
