//! Synchronization engine shared by every KFP resource kind
//!
//! [`StateHandler`] decides what a resource needs next and returns it as
//! [`Command`]s; [`CommandExecutor`] carries them out.

#![deny(missing_docs)]

pub mod command;
pub mod error;
pub mod executor;
pub mod generation;
pub mod handler;
pub mod phase;
pub mod verifier;

pub use command::{Command, SetStatus, Transition};
pub use error::EngineError;
pub use executor::{CommandExecutor, KubeResourceClient, ResourceClient};
pub use handler::{provider_changed_guard, StateHandler, PROVIDER_CHANGED};
