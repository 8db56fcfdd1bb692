//! Service registration seam and environment-gated capabilities.
//!
//! # Design Decisions
//! - Registrars are invoked once, when the gRPC transport is constructed
//! - Optional registrations are decided by a capability set derived from the
//!   environment; request handling never branches on the environment

use std::sync::Arc;

use prost_types::{FileDescriptorProto, FileDescriptorSet};
use tonic::service::{Routes, RoutesBuilder};

use crate::config::Environment;

/// Something that contributes services to the gRPC transport.
pub trait ServiceRegistrar: Send + Sync {
    fn register_services(&self, routes: &mut RoutesBuilder);

    /// Descriptors advertised through reflection, when enabled.
    fn file_descriptors(&self) -> Vec<FileDescriptorProto> {
        Vec::new()
    }
}

/// Optional registrations enabled for an environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    reflection: bool,
}

impl Capabilities {
    pub fn for_environment(env: Environment) -> Self {
        Self {
            reflection: env.is_development(),
        }
    }

    /// Expose `grpc.reflection.v1` so tooling can enumerate methods.
    pub fn reflection(&self) -> bool {
        self.reflection
    }
}

/// Assemble the route table from `registrars`, adding reflection when the
/// capabilities allow it.
pub fn build_routes(
    registrars: &[Arc<dyn ServiceRegistrar>],
    capabilities: Capabilities,
) -> Result<Routes, tonic_reflection::server::Error> {
    let mut builder = Routes::builder();
    for registrar in registrars {
        registrar.register_services(&mut builder);
    }

    if capabilities.reflection() {
        let descriptors = FileDescriptorSet {
            file: registrars
                .iter()
                .flat_map(|registrar| registrar.file_descriptors())
                .collect(),
        };
        let reflection = tonic_reflection::server::Builder::configure()
            .register_file_descriptor_set(descriptors)
            .build_v1()?;
        builder.add_service(reflection);
        tracing::info!("gRPC reflection enabled");
    }

    Ok(builder.routes())
}
