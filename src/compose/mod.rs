//! Desired-state computation for the global compose project.
//!
//! [`ConfigGenerator`] turns settings plus persisted options (database
//! password, network subnets) into a [`DesiredState`] and writes it out as
//! `services/docker-compose.yml`. The file is write-only from our side;
//! compose itself is the only reader.

mod descriptor;
mod generator;

pub use descriptor::{
    ComposeFile, DesiredState, GlobalServiceDescriptor, NetworkDescriptor, VolumeMount,
};
pub use generator::{generate_password, ConfigGenerator};
