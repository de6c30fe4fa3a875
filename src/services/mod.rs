//! Services
//!
//! Business logic behind the HTTP API and the CLI.

pub mod engine;
pub mod entitlement;
pub mod extraction;
pub mod notifier;
pub mod research;

pub use engine::{DashboardView, DocumentAnalysis, SessionEngine, StartRequest};
pub use entitlement::{EntitlementError, EntitlementService, NoEntitlements, SupabaseEntitlements};
pub use notifier::{AccessRequest, AccessRequestNotifier};
