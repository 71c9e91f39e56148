//! Sequences daemon startup, background activities, and the serve loop.

use std::sync::Arc;

use tracing::{info, warn};

use federation_config::Config;

use crate::dispatch::RemoteWatchDispatcher;
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::mutation::{MutationLoop, MutationPlan};
use crate::observer::{LoggingObserver, ResourceObserver};
use crate::security::{PemSecurityConfigBuilder, SecurityConfigBuilder};
use crate::server::FederationServerFactory;
use crate::service::{ResourceService, ServiceFactory};

use super::activities::BackgroundActivities;
use super::errors::LaunchError;
use super::shutdown::{
    ProcessExit, ShutdownHandler, ShutdownLatch, ShutdownSignal, SystemExit, SystemShutdownSignal,
};
use super::{LIFECYCLE_TARGET, SHUTDOWN_TIMEOUT};

/// Process-level collaborators: where termination requests come from and how
/// the process ends.
pub(crate) struct ProcessControl<G, X> {
    pub(crate) shutdown: G,
    pub(crate) exit: X,
}

/// Collaborators used to build and observe the resource service.
pub(crate) struct ServiceDeps<B, F, O> {
    pub(crate) security: B,
    pub(crate) factory: F,
    pub(crate) observer: O,
    pub(crate) reporter: Arc<dyn HealthReporter>,
}

/// Everything the orchestrator needs besides configuration.
pub(crate) struct LaunchPlan<G, X, B, F, O> {
    pub(crate) process: ProcessControl<G, X>,
    pub(crate) services: ServiceDeps<B, F, O>,
}

/// Runs the daemon using the production collaborators.
///
/// Returns only when startup fails or, in builds where the exit hook returns,
/// after shutdown handling completes. In production the shutdown handler ends
/// the process directly with a success status.
pub fn run_federation(config: &Config) -> Result<(), LaunchError> {
    let reporter: Arc<dyn HealthReporter> = Arc::new(StructuredHealthReporter::new());
    let shutdown = match SystemShutdownSignal::install() {
        Ok(shutdown) => shutdown,
        Err(source) => {
            let error = LaunchError::from(source);
            reporter.startup_failed(&error);
            return Err(error);
        }
    };
    let plan = LaunchPlan {
        process: ProcessControl {
            shutdown,
            exit: SystemExit,
        },
        services: ServiceDeps {
            security: PemSecurityConfigBuilder,
            factory: FederationServerFactory::new(config.upstream().map(str::to_owned)),
            observer: LoggingObserver::new(),
            reporter,
        },
    };
    run_federation_with(config, plan)
}

/// Runs the daemon with injected collaborators.
pub(crate) fn run_federation_with<G, X, B, F, O>(
    config: &Config,
    plan: LaunchPlan<G, X, B, F, O>,
) -> Result<(), LaunchError>
where
    G: ShutdownSignal + 'static,
    X: ProcessExit + 'static,
    B: SecurityConfigBuilder,
    F: ServiceFactory,
    O: ResourceObserver,
{
    let reporter = Arc::clone(&plan.services.reporter);
    let result = launch(config, plan);
    if let Err(error) = &result {
        reporter.startup_failed(error);
    }
    result
}

fn launch<G, X, B, F, O>(config: &Config, plan: LaunchPlan<G, X, B, F, O>) -> Result<(), LaunchError>
where
    G: ShutdownSignal + 'static,
    X: ProcessExit + 'static,
    B: SecurityConfigBuilder,
    F: ServiceFactory,
    O: ResourceObserver,
{
    let LaunchPlan { process, services } = plan;
    let ProcessControl { shutdown, exit } = process;
    let ServiceDeps {
        security,
        factory,
        observer,
        reporter,
    } = services;

    reporter.startup_starting(config.port());
    let security = security.build(config.root_cas(), config.certificate(), config.key())?;
    reporter.security_ready(security.root_ca_count());

    let service = Arc::new(factory.create(config.port(), &security, config.connection_context())?);
    reporter.service_ready(config.port(), config.connection_context());

    let latch = Arc::new(ShutdownLatch::new());
    let mut activities = BackgroundActivities::new();

    let handler = ShutdownHandler::new(
        Arc::clone(&service),
        Arc::clone(&latch),
        exit,
        Arc::clone(&reporter),
    );
    activities.spawn("shutdown", move || {
        if let Err(error) = handler.run(&shutdown) {
            warn!(
                target: LIFECYCLE_TARGET,
                error = %error,
                "shutdown listener stopped before handling a signal"
            );
        }
    })?;

    let mutation = MutationLoop::new(Arc::clone(&service), MutationPlan::from_config(config));
    let mutation_latch = Arc::clone(&latch);
    if let Err(error) = activities.spawn("mutation", move || {
        mutation.run(&mutation_latch);
    }) {
        activities.abandon(&latch);
        return Err(error);
    }

    let dispatcher = RemoteWatchDispatcher::new(config.watch_id(), observer);
    match dispatcher.subscribe(service.as_ref()) {
        Ok(summary) => reporter.watch_closed(dispatcher.watch_id(), &summary),
        Err(error) => {
            activities.abandon(&latch);
            return Err(error.into());
        }
    }

    reporter.serving();
    if let Err(error) = service.start() {
        reporter.serve_failed(&error);
    }

    latch.wait();
    activities.join(SHUTDOWN_TIMEOUT);
    info!(
        target: LIFECYCLE_TARGET,
        "shutdown sequence completed"
    );
    Ok(())
}
