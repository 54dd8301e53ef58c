//! Per-request admission decisions.

mod decision;
mod pipeline;

pub use decision::{Admission, Admitted, Denial, DenyReason, StoreFailureMode};
pub use pipeline::{AdmissionPipeline, AdmissionRequest};
