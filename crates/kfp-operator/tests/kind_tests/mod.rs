//! Integration tests for the KFP operator
//!
//! These tests require a Kubernetes cluster (kind) and tell the story of how
//! pipeline authors interact with the operator.
//!
//! - `crd_operations`: creating and reading resources through the
//!   Kubernetes API, including defaulting and printer columns
//!
//! - `controllers`: stories that run the controllers in-process against the
//!   cluster. None of them need Argo: they cover the Provider service
//!   deployment and RunConfiguration schedule ownership.
//!
//! ```bash
//! cargo test -p kfp-operator --test kind -- --ignored --nocapture
//! ```

mod controllers;
mod crd_operations;
mod helpers;
