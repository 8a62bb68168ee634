//! Lifecycle engine for a parametric windstorm insurance product.
//!
//! Policies pay on measured storm data, not on loss adjustment. An applicant
//! files an application; an external oracle underwrites it, later reports
//! the storm outcome, and finally confirms settlement. The oracle cannot be
//! called synchronously, so every step that waits on it publishes an
//! [`events::Event`] carrying a correlation id the oracle echoes back.
//!
//! [`engine::Engine`] is the state machine. It is generic over a
//! [`payout::PayoutRegime`], the rule that turns a storm report into a cell
//! of the application's payout table.

pub mod access;
pub mod allocator;
pub mod analysis;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod ledger;
pub mod payout;
pub mod service;
pub mod simulation;
pub mod types;

pub use engine::Engine;
pub use error::EngineError;
