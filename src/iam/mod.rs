//! IAM policy merge.
//!
//! This module provides:
//! - Role allow-lists per resource type
//! - [`IamUpdater`] for policy reads and validated writes
//! - Policy mode and binding mode via [`PolicyManager`]
//! - A per-resource-name [`MutexTable`]

mod binding;
mod lock;
mod roles;
mod updater;

pub use binding::PolicyManager;
pub use lock::{KeyGuard, MutexTable};
pub use roles::{IamResourceType, PROJECT_ROLES, RADAR_RESOURCE_ROLES, RoleAllowList};
pub use updater::{IamUpdater, MUTEX_KEY_PREFIX};
