//! Trait seams between the engine and its environment
//!
//! Each trait is object safe and implemented by an external crate (probers,
//! providers, notifiers) or by the in-crate state stores. Tests substitute
//! mocks at the same seams.

pub mod dns_provider;
pub mod notifier;
pub mod prober;
pub mod state_store;

pub use dns_provider::DnsProvider;
pub use notifier::{LogNotifier, Notifier};
pub use prober::{ProbeOutcome, Prober, UnreachableReason};
pub use state_store::StateStore;
