//! # Controller
//!
//! The reconciliation loop: pass stages, the apply decision and pass
//! scheduling.

mod apply;
mod polling;
mod reconciler;

pub use apply::{kube_apply, ApplyOptions, ApplyOutcome};
pub use polling::{report_pass_error, with_polling, Polling, WakeReason, Wakeup};
pub use reconciler::{PassSummary, Reconciler, ReconcilerOptions, RenderedDocument, Selection};
