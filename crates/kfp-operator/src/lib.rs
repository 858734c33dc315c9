//! KFP operator: CRD installation and controller wiring

#![deny(missing_docs)]

/// CRD manifests and installation
pub mod crds;
/// Controller construction for every resource kind
pub mod runner;
