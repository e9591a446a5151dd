//! Reconciliation engine.
//!
//! - [`cross_reference`] snapshots the four stores and classifies every
//!   resource as owned, defective or orphaned
//! - [`dispatcher`] runs the bulk repair pipeline for a tenant
//! - [`model_reconciler`] repairs one model at a time

mod claims;
pub mod cross_reference;
pub mod dispatcher;
pub mod model_reconciler;
mod settle;

pub use claims::{ownership_order, Claim, ClaimOutcome, ClaimTable};
pub use cross_reference::{build_report, cross_reference, fetch_snapshot, TenantSnapshot};
pub use dispatcher::reconcile_tenant;
pub use model_reconciler::{
    assemble_complete_model, cascade_delete, choose_action, duplicate_to_remove, reconcile_model,
    reconcile_model_until_settled,
};
pub use settle::settle_all;
