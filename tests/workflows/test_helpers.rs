//! Shared fixtures for workflow BDD scenarios.

use std::sync::Arc;

use lhc::access::{AccessRequest, Provisioner, Resolver};
use lhc::copy::CopyEngine;
use lhc::naming::EphemeralNames;
use lhc::ops::VolumeOperations;
use lhc::test_support::{FakeExec, InMemoryCluster};
use rstest::fixture;
use tokio_util::sync::CancellationToken;

pub const NAMESPACE: &str = "default";

#[derive(Clone, Debug)]
pub struct WorkflowContext {
    pub cluster: InMemoryCluster,
    pub exec: FakeExec,
    pub output: String,
    pub outcome: Option<Result<(), String>>,
}

#[fixture]
pub fn workflow_context() -> WorkflowContext {
    WorkflowContext {
        cluster: InMemoryCluster::new(),
        exec: FakeExec::new(),
        output: String::new(),
        outcome: None,
    }
}

impl WorkflowContext {
    pub fn operations(&self) -> VolumeOperations<InMemoryCluster, FakeExec> {
        let cancel = CancellationToken::new();
        let channel = Arc::new(self.exec.clone());
        let resolver = Resolver::new(Provisioner::new(self.cluster.clone(), cancel.clone()));
        let engine = CopyEngine::new(Arc::clone(&channel), cancel);
        VolumeOperations::new(resolver, channel, engine)
    }
}

pub fn request(volume: &str) -> AccessRequest {
    AccessRequest::new(volume, NAMESPACE, "longhorn")
}

pub fn access_pod(volume: &str) -> String {
    EphemeralNames::for_volume(volume).pod
}
