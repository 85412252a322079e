// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # HCP Vault Radar Reconcile
//!
//! Reconciliation engine behind the HCP Vault Radar Terraform provider.
//!
//! ## Overview
//!
//! The crate drives remote Vault Radar objects (scan sources, secret-manager
//! connections, integration connections and subscriptions) towards a desired
//! state, and merges IAM bindings into resource policies:
//!
//! - Idempotent create guarded by a name pre-check
//! - Soft delete followed by a bounded wait for the remote hard delete
//! - Updates that send only the fields that drifted
//! - Policy and binding mode IAM updates, serialized per resource
//!
//! ## Modules
//!
//! - [`config`]: Provider configuration, validation and payload fingerprints
//! - [`state`]: Desired and observed state model
//! - [`remote`]: Remote API seams and an in-memory control plane
//! - [`planner`]: Drift computation and update plans
//! - [`context`]: Cancellation and deadlines
//! - [`offboard`]: Offboard-wait poller
//! - [`reconciler`]: Create, read, update, delete and import
//! - [`iam`]: IAM policy merge
//! - [`logging`]: Subscriber setup
//!
//! ## Example
//!
//! ```no_run
//! use hcp_radar_reconcile::{
//!     DesiredState, InMemoryApi, OperationContext, Reconciler, ResourceKind, TokioClock,
//! };
//!
//! # async fn demo() -> hcp_radar_reconcile::Result<()> {
//! let api = InMemoryApi::new();
//! let reconciler = Reconciler::new(&api, TokioClock).with_default_project("project-1");
//! let ctx = OperationContext::background();
//!
//! let desired = DesiredState::new(ResourceKind::ScanSource).with_token("s3cr3t");
//! let observed = reconciler.create(&ctx, &desired).await?;
//! reconciler.delete(&ctx, &observed.instance).await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod config;
pub mod context;
pub mod error;
pub mod iam;
pub mod logging;
pub mod offboard;
pub mod planner;
pub mod reconciler;
pub mod remote;
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use config::{ConfigParser, ConfigValidator, PayloadHasher, ProviderConfig};
pub use context::{CancelHandle, OperationContext};
pub use error::{ErrorKind, RadarError, Result};
pub use iam::{IamResourceType, IamUpdater, MutexTable, PolicyManager, RoleAllowList};
pub use logging::{init_json_logging, init_logging, try_init_logging};
pub use offboard::{Clock, OffboardPoller, PollReport, PollSettings, TokioClock};
pub use planner::{DriftEngine, UpdateDiff, UpdatePlan};
pub use reconciler::{DeleteOutcome, ReadOutcome, Reconciler};
pub use remote::{InMemoryApi, Policy, PolicyApi, PolicyBinding, ResourceApi};
pub use state::{DesiredState, Field, ObservedState, ProjectScope, ResourceInstance, ResourceKind};
