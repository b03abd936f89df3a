// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Reconciliation of `HTTPProxy` parents and their generated children.
//!
//! # Available Reconcilers
//!
//! - [`reconcile_httpproxy`] - Creates/updates the children of an `HTTPProxy`,
//!   or cleans up cross-namespace children when it is being deleted
//!
//! # Helpers
//!
//! - [`cleanup`] - Deletion of children placed in other namespaces
//! - [`finalizers`] - Adding and removing the parent finalizer
//!
//! # Example: Using a Reconciler
//!
//! ```rust,no_run
//! use contour_plus::context::Context;
//! use contour_plus::key::ObjectKey;
//! use contour_plus::reconcilers::reconcile_httpproxy;
//!
//! async fn reconcile_one(ctx: &Context) -> Result<(), contour_plus::errors::Error> {
//!     reconcile_httpproxy(ctx, &ObjectKey::new("default", "web")).await
//! }
//! ```

pub mod cleanup;
pub mod finalizers;
pub mod httpproxy;

#[cfg(test)]
mod cleanup_tests;

pub use httpproxy::reconcile_httpproxy;
