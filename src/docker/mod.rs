//! Docker utilities for the global containers.
//!
//! All Docker CLI interactions go through [`DockerClient`], which wraps a
//! [`CommandRunner`](crate::exec::CommandRunner) with container-domain
//! semantics. Every operation is safe to repeat: creation is always preceded
//! by an existence check.

pub mod client;
pub mod error;

pub use client::{ComposeCommand, ContainerStatus, DockerClient};
pub use error::DockerError;
