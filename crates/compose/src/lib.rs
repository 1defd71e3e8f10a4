//! Bridge compose: build a validated domain object from an annotated schema
//! by fetching the minimum set of backing resources.

#![forbid(unsafe_code)]

pub mod composer;
pub mod fetcher;
pub mod names;
pub mod planner;
pub mod transform;

pub use composer::{compose, compose_report, ComposeError, Composer, Composition, FieldDiagnostic, Stage};
pub use fetcher::{fetch, ResourceBag};
pub use names::{interpolate, resolve_names};
pub use planner::plan;
pub use transform::{OperationalStatus, ReplicaSnapshot};
