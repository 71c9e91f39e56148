//! Demo mutation loop that keeps one resource moving through its lifecycle.
//!
//! Each cycle creates the resource, replaces it with a renamed copy, then
//! deletes it, pausing a fixed interval after every write. A failed write
//! abandons the rest of the cycle; the next cycle starts again from create.

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use federation_config::Config;
use federation_types::FederatedResource;

use crate::lifecycle::ShutdownLatch;
use crate::service::{ResourceRegistry, ServiceError};

const MUTATION_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::mutation");

/// Write step within one mutation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationStep {
    /// Initial upsert of the resource.
    Create,
    /// Full replacement with the mutated resource.
    Update,
    /// Removal of the resource.
    Delete,
}

impl MutationStep {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for MutationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A write failure that abandoned the current cycle.
#[derive(Debug, Error)]
#[error("failed to {step} resource '{key}': {source}")]
pub struct CycleError {
    /// Step that failed.
    pub step: MutationStep,
    /// Key of the resource being written.
    pub key: String,
    /// Error reported by the registry.
    #[source]
    pub source: ServiceError,
}

/// How a cycle ended without a write failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// All three writes and pauses completed.
    Completed,
    /// Shutdown was requested during a pause.
    Interrupted,
}

/// What the loop writes and how it paces the writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationPlan {
    resource: FederatedResource,
    updated_name: String,
    interval: Duration,
}

impl MutationPlan {
    /// Builds a plan cycling `fqdn` between two display names.
    pub fn new(
        fqdn: impl Into<String>,
        name: impl Into<String>,
        updated_name: impl Into<String>,
        interval: Duration,
    ) -> Self {
        Self {
            resource: FederatedResource::new(fqdn, name),
            updated_name: updated_name.into(),
            interval,
        }
    }

    /// Derives the plan from the daemon configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.demo_fqdn(),
            config.demo_name(),
            config.demo_updated_name(),
            config.mutation_interval(),
        )
    }

    /// Key of the cycled resource.
    #[must_use]
    pub fn key(&self) -> &str {
        self.resource.fqdn()
    }

    /// Fixed pause after each write.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }
}

/// Runs create/update/delete cycles against a registry.
pub struct MutationLoop<R> {
    registry: R,
    plan: MutationPlan,
}

impl<R> MutationLoop<R>
where
    R: ResourceRegistry,
{
    /// Builds a loop writing to `registry`.
    pub const fn new(registry: R, plan: MutationPlan) -> Self {
        Self { registry, plan }
    }

    /// Repeats cycles until `latch` fires.
    ///
    /// Returns the number of completed cycles.
    pub fn run(&self, latch: &ShutdownLatch) -> u64 {
        info!(
            target: MUTATION_TARGET,
            fqdn = self.plan.key(),
            interval_ms = self.plan.interval.as_millis(),
            "mutation loop started"
        );
        let mut completed = 0_u64;
        while !latch.is_triggered() {
            match self.run_cycle(latch) {
                Ok(CycleOutcome::Completed) => completed += 1,
                Ok(CycleOutcome::Interrupted) => break,
                Err(error) => {
                    warn!(
                        target: MUTATION_TARGET,
                        operation = %error.step,
                        fqdn = %error.key,
                        error = %error.source,
                        "mutation cycle abandoned"
                    );
                    if latch.wait_timeout(self.plan.interval) {
                        break;
                    }
                }
            }
        }
        info!(
            target: MUTATION_TARGET,
            cycles = completed,
            "mutation loop stopped"
        );
        completed
    }

    /// Runs one create, update, delete cycle.
    ///
    /// Stops at the first failed write without attempting the later steps.
    pub fn run_cycle(&self, latch: &ShutdownLatch) -> Result<CycleOutcome, CycleError> {
        let key = self.plan.key();
        let created = &self.plan.resource;
        self.write(MutationStep::Create, || self.registry.upsert(key, created))?;
        info!(
            target: MUTATION_TARGET,
            fqdn = key,
            name = created.name(),
            "created local resource"
        );
        if latch.wait_timeout(self.plan.interval) {
            return Ok(CycleOutcome::Interrupted);
        }

        let updated = created.renamed(self.plan.updated_name.as_str());
        self.write(MutationStep::Update, || self.registry.upsert(key, &updated))?;
        info!(
            target: MUTATION_TARGET,
            fqdn = key,
            name = updated.name(),
            "updated local resource"
        );
        if latch.wait_timeout(self.plan.interval) {
            return Ok(CycleOutcome::Interrupted);
        }

        self.write(MutationStep::Delete, || self.registry.delete(key))?;
        info!(
            target: MUTATION_TARGET,
            fqdn = key,
            "deleted local resource"
        );
        if latch.wait_timeout(self.plan.interval) {
            return Ok(CycleOutcome::Interrupted);
        }
        Ok(CycleOutcome::Completed)
    }

    fn write<F>(&self, step: MutationStep, operation: F) -> Result<(), CycleError>
    where
        F: FnOnce() -> Result<(), ServiceError>,
    {
        operation().map_err(|source| CycleError {
            step,
            key: self.plan.key().to_owned(),
            source,
        })
    }
}
