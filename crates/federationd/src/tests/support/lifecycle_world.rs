//! Orchestrator test world shared across lifecycle scenarios.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use federation_config::Config;

use crate::health::HealthReporter;
use crate::lifecycle::LaunchError;
use crate::lifecycle::launch::{LaunchPlan, ProcessControl, ServiceDeps, run_federation_with};
use crate::security::PemSecurityConfigBuilder;
use crate::security::test_support::PemDir;

use super::{
    HealthEvent, RecordingHealthReporter, RecordingObserver, ScriptedFactory, ScriptedService,
    ServiceCall, TestExit, TestShutdownSignal,
};

pub const WAIT_TIMEOUT: Duration = Duration::from_secs(5);
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

pub type StepResult = Result<(), String>;

pub struct LifecycleWorld {
    pems: PemDir,
    missing_root: bool,
    pub service: ScriptedService,
    pub factory: ScriptedFactory,
    pub observer: Arc<RecordingObserver>,
    pub reporter: Arc<RecordingHealthReporter>,
    pub signal: TestShutdownSignal,
    pub exit: TestExit,
    handle: Option<thread::JoinHandle<Result<(), LaunchError>>>,
    result: Option<Result<(), LaunchError>>,
}

impl Default for LifecycleWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleWorld {
    pub fn new() -> Self {
        let service = ScriptedService::new();
        Self {
            pems: PemDir::new(),
            missing_root: false,
            factory: ScriptedFactory::new(service.clone()),
            service,
            observer: Arc::new(RecordingObserver::default()),
            reporter: Arc::new(RecordingHealthReporter::default()),
            signal: TestShutdownSignal::new(),
            exit: TestExit::default(),
            handle: None,
            result: None,
        }
    }

    /// Points the root CA setting at a file that does not exist.
    pub fn use_missing_root_ca(&mut self) {
        self.missing_root = true;
    }

    fn config(&self) -> Result<Config, String> {
        let (mut roots, cert, key) = self.pems.valid_set();
        if self.missing_root {
            roots = vec![self.pems.dir.path().join("absent-ca.pem")];
        }
        let roots = roots
            .iter()
            .map(|path| path.display().to_string())
            .collect::<Vec<_>>()
            .join(",");
        Config::load_from_iter([
            "federationd".to_owned(),
            format!("--root-ca={roots}"),
            format!("--cert={}", cert.display()),
            format!("--key={}", key.display()),
            "--port=8000".to_owned(),
            "--mutation-interval-ms=1".to_owned(),
        ])
        .map_err(|error| error.to_string())
    }

    fn plan(
        &self,
    ) -> LaunchPlan<TestShutdownSignal, TestExit, PemSecurityConfigBuilder, ScriptedFactory, Arc<RecordingObserver>>
    {
        LaunchPlan {
            process: ProcessControl {
                shutdown: self.signal.clone(),
                exit: self.exit.clone(),
            },
            services: ServiceDeps {
                security: PemSecurityConfigBuilder,
                factory: self.factory.clone(),
                observer: Arc::clone(&self.observer),
                reporter: self.reporter.clone() as Arc<dyn HealthReporter>,
            },
        }
    }

    /// Runs the orchestrator on a background thread.
    pub fn start(&mut self) -> StepResult {
        if self.handle.is_some() || self.result.is_some() {
            return Err("orchestrator already started".to_owned());
        }
        let config = self.config()?;
        let plan = self.plan();
        self.handle = Some(thread::spawn(move || run_federation_with(&config, plan)));
        Ok(())
    }

    /// Waits for the orchestrator to return on its own, without any signal.
    pub fn await_result(&mut self) -> StepResult {
        let handle = self
            .handle
            .take()
            .ok_or_else(|| "orchestrator not running".to_owned())?;
        let deadline = Instant::now() + WAIT_TIMEOUT;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                self.handle = Some(handle);
                return Err("orchestrator did not return".to_owned());
            }
            thread::sleep(POLL_INTERVAL);
        }
        let result = handle
            .join()
            .map_err(|_| "orchestrator thread panicked".to_owned())?;
        self.result = Some(result);
        Ok(())
    }

    pub fn wait_until_serving(&self) -> StepResult {
        self.service
            .wait_for(WAIT_TIMEOUT, |calls| calls.contains(&ServiceCall::Start))
    }

    pub fn wait_for_health(&self, predicate: impl Fn(&HealthEvent) -> bool) -> StepResult {
        let deadline = Instant::now() + WAIT_TIMEOUT;
        while Instant::now() < deadline {
            if self.reporter.contains(&predicate) {
                return Ok(());
            }
            thread::sleep(POLL_INTERVAL);
        }
        Err(format!(
            "health event not observed; events: {:?}",
            self.reporter.events()
        ))
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn last_error(&self) -> Option<&LaunchError> {
        self.result.as_ref()?.as_ref().err()
    }

    pub fn succeeded(&self) -> bool {
        matches!(self.result, Some(Ok(())))
    }

    pub fn stop_calls(&self) -> usize {
        self.service.count(|call| *call == ServiceCall::Stop)
    }
}

impl Drop for LifecycleWorld {
    fn drop(&mut self) {
        self.signal.close();
    }
}
