//! Lifecycle orchestrator
//!
//! Drives a whole smoke run:
//! 1. Optional org/space setup
//! 2. Push the test application (not started)
//! 3. One lifecycle pass per plan: create, bind, verify, unbind, destroy
//! 4. Delete the application and the org
//!
//! Every `can ...` step is reported on its own. Cleanup is keyed on the
//! provisioning flags, so it runs however far a pass got.

use crate::config::{ContextSettings, SmokeConfig};
use crate::error::LifecycleError;
use crate::identifier::IdentifierGenerator;
use crate::pattern;
use crate::platform::{PlatformClient, PlatformCommand, PushOptions};
use crate::polling::Poller;
use crate::probe::{AppEndpoints, Probe};
use crate::report::{StepOutcome, StepReport, SuiteReport};
use crate::sql::SchemaTarget;
use crate::verification::CrudSequence;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant};
use tracing::{error, info, warn};

/// Provisioning flags of one service instance
///
/// Flags only ever go from false to true.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LifecycleState {
    created: bool,
    bound: bool,
    running: bool,
}

impl LifecycleState {
    /// Instance exists on the platform
    #[inline]
    #[must_use]
    pub fn is_created(&self) -> bool {
        self.created
    }

    /// Instance is bound to the application
    #[inline]
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.bound
    }

    /// Application answered its liveness probe with the binding attached
    #[inline]
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    fn mark_created(&mut self) {
        self.created = true;
    }

    fn mark_bound(&mut self) {
        self.bound = true;
    }

    fn mark_running(&mut self) {
        self.running = true;
    }
}

/// Sequences platform actions and database verification
pub struct LifecycleOrchestrator {
    config: SmokeConfig,
    platform: Arc<dyn PlatformClient>,
    poller: Poller,
    generator: IdentifierGenerator,
    app_name: String,
    endpoints: AppEndpoints,
    report: SuiteReport,
}

impl LifecycleOrchestrator {
    /// Create an orchestrator for a validated configuration
    ///
    /// The generator is seeded from `config.seed` when present; the app,
    /// instance and org names come from it too, so a seeded run reuses them.
    #[must_use]
    pub fn new(config: SmokeConfig, platform: Arc<dyn PlatformClient>, probe: Arc<dyn Probe>) -> Self {
        let mut generator = match config.seed {
            Some(seed) => IdentifierGenerator::with_seed(config.max_key_length, seed),
            None => IdentifierGenerator::new(config.max_key_length),
        };
        let poller = Poller::new(probe, config.eventually_policy(), config.consistently_policy());
        let app_name = generator.uuid_name();
        let endpoints = AppEndpoints::new(&app_name, &config.apps_domain);

        Self {
            config,
            platform,
            poller,
            generator,
            app_name,
            endpoints,
            report: SuiteReport::default(),
        }
    }

    /// Name of the pushed application
    #[must_use]
    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    /// Steps reported so far
    #[must_use]
    pub fn report(&self) -> &SuiteReport {
        &self.report
    }

    /// Run the whole suite and return its report
    ///
    /// A failed org/space setup skips the push and every plan pass, since
    /// the platform target is then unknown. The picked org is still deleted.
    pub async fn run(mut self) -> SuiteReport {
        let context = self.config.context_settings();
        let mut org = None;
        let mut isolated = true;
        if let Some(settings) = &context {
            let name = format!("{}-{}", settings.org_prefix, self.generator.uuid_name());
            let started = Instant::now();
            let result = self.setup_context(settings, &name).await;
            isolated = result.is_ok();
            // The org may exist even if a later setup command failed.
            org = Some(name);
            self.record("can set up an isolated org and space", started, result);
        }

        if isolated {
            self.run_in_target().await;
        } else {
            self.skip_all("org and space setup failed");
        }

        if let Some(org) = org {
            let started = Instant::now();
            let result = self.run_platform(&PlatformCommand::DeleteOrg { org }).await;
            self.record("can delete the isolated org", started, result);
        }

        self.report
    }

    async fn run_in_target(&mut self) {
        let started = Instant::now();
        let result = self.push_app(true).await;
        self.record("can push the application", started, result);

        for plan in self.config.plan_names.clone() {
            self.run_pass(&plan).await;
        }

        let started = Instant::now();
        let command = PlatformCommand::DeleteApp {
            app: self.app_name.clone(),
            force: true,
        };
        let result = self.run_platform(&command).await;
        self.record("can delete the application", started, result);
    }

    fn skip_all(&mut self, reason: &str) {
        self.skip("can push the application", reason);
        for plan in self.config.plan_names.clone() {
            for name in pass_steps(&plan) {
                self.skip(name, reason);
            }
        }
        self.skip("can delete the application", reason);
    }

    /// One lifecycle pass for `plan`
    ///
    /// Returns the provisioning flags as they were when cleanup started.
    pub async fn run_pass(&mut self, plan: &str) -> LifecycleState {
        let [create_step, verify_step, unbind_step, destroy_step] = pass_steps(plan);
        let instance = self.generator.uuid_name();
        let mut state = LifecycleState::default();
        info!("Starting lifecycle pass for plan {} (instance {})", plan, instance);

        let started = Instant::now();
        let result = self.create_and_bind(plan, &instance, &mut state).await;
        self.record(create_step, started, result);

        let started = Instant::now();
        let result = if state.is_running() {
            self.verify_database().await
        } else {
            Err(LifecycleError::Precondition(
                "application is not running with a bound instance".to_string(),
            ))
        };
        self.record(verify_step, started, result);

        let captured = state;
        self.cleanup(&instance, captured, unbind_step, destroy_step).await;
        captured
    }

    async fn setup_context(&self, settings: &ContextSettings, org: &str) -> Result<(), LifecycleError> {
        let space = format!("{org}-space");
        let commands = [
            PlatformCommand::Api {
                endpoint: settings.api.clone(),
                skip_ssl_validation: settings.skip_ssl_validation,
            },
            PlatformCommand::Auth {
                user: settings.admin_user.clone(),
                password: settings.admin_password.clone(),
            },
            PlatformCommand::CreateOrg {
                org: org.to_string(),
            },
            PlatformCommand::CreateSpace {
                org: org.to_string(),
                space: space.clone(),
            },
            PlatformCommand::Target {
                org: org.to_string(),
                space,
            },
        ];
        for command in &commands {
            self.run_platform(command).await?;
        }
        Ok(())
    }

    async fn create_and_bind(
        &mut self,
        plan: &str,
        instance: &str,
        state: &mut LifecycleState,
    ) -> Result<(), LifecycleError> {
        self.run_platform(&PlatformCommand::CreateService {
            service: self.config.service_name.clone(),
            plan: plan.to_string(),
            instance: instance.to_string(),
        })
        .await?;
        state.mark_created();

        self.run_platform(&PlatformCommand::BindService {
            app: self.app_name.clone(),
            instance: instance.to_string(),
        })
        .await?;
        state.mark_bound();

        self.push_app(false).await?;
        self.assert_app_is_running().await?;
        state.mark_running();
        Ok(())
    }

    async fn verify_database(&mut self) -> Result<(), LifecycleError> {
        let namespace = self.generator.generate_namespace(&self.config.reserved_schemas);
        let targets = [SchemaTarget::Default, SchemaTarget::Created(namespace)];

        let crud = CrudSequence::new(&self.poller, &self.endpoints, self.config.num_insertions);
        for target in &targets {
            info!("Verifying CRUD behavior in schema {}", target);
            crud.run(target, &mut self.generator).await?;
        }
        Ok(())
    }

    async fn cleanup(
        &mut self,
        instance: &str,
        state: LifecycleState,
        unbind_step: String,
        destroy_step: String,
    ) {
        if state.is_bound() {
            let started = Instant::now();
            let result = self
                .run_platform(&PlatformCommand::UnbindService {
                    app: self.app_name.clone(),
                    instance: instance.to_string(),
                })
                .await;
            if result.is_err() {
                warn!("Unbind failed; still attempting to destroy {}", instance);
            }
            self.record(unbind_step, started, result);
        } else {
            self.skip(unbind_step, "instance was never bound");
        }

        if state.is_created() {
            let started = Instant::now();
            let result = self
                .run_platform(&PlatformCommand::DeleteService {
                    instance: instance.to_string(),
                    force: true,
                })
                .await;
            self.record(destroy_step, started, result);
        } else {
            self.skip(destroy_step, "instance was never created");
        }
    }

    async fn push_app(&self, no_start: bool) -> Result<(), LifecycleError> {
        self.run_platform(&PlatformCommand::Push {
            app: self.app_name.clone(),
            options: PushOptions {
                memory: self.config.app_memory.clone(),
                path: self.config.app_path.clone(),
                stack: self.config.app_stack.clone(),
                no_start,
            },
        })
        .await
    }

    async fn assert_app_is_running(&self) -> Result<(), LifecycleError> {
        let ping = self.endpoints.ping();
        info!("Checking that the app is responding at url: {}", ping.url);
        self.poller.eventually(&ping, &pattern::success()).await
    }

    /// Run a platform command under the scaled timeout
    async fn run_platform(&self, command: &PlatformCommand) -> Result<(), LifecycleError> {
        let shown = command.display_args();
        let timeout = self.config.scaled_timeout();
        info!("cf {}", shown);

        match time::timeout(timeout, self.platform.execute(command)).await {
            Err(_) => Err(LifecycleError::PlatformTimeout {
                command: shown,
                timeout,
            }),
            Ok(Err(source)) => Err(LifecycleError::PlatformUnavailable {
                command: shown,
                source,
            }),
            Ok(Ok(0)) => Ok(()),
            Ok(Ok(exit_code)) => Err(LifecycleError::ProvisioningFailure {
                command: shown,
                exit_code,
            }),
        }
    }

    fn record(&mut self, name: impl Into<String>, started: Instant, result: Result<(), LifecycleError>) {
        let name = name.into();
        let elapsed = started.elapsed();
        let outcome = match result {
            Ok(()) => {
                info!("[PASS] {} ({:?})", name, elapsed);
                StepOutcome::Passed
            }
            Err(e) => {
                error!("[FAIL] {}: {}", name, e);
                StepOutcome::Failed(e.to_string())
            }
        };
        self.report.push(StepReport::new(name, outcome, elapsed));
    }

    fn skip(&mut self, name: impl Into<String>, reason: &str) {
        let name = name.into();
        info!("[SKIP] {}: {}", name, reason);
        self.report
            .push(StepReport::new(name, StepOutcome::Skipped(reason.to_string()), Duration::ZERO));
    }
}

/// Step names of one plan pass, in report order
fn pass_steps(plan: &str) -> [String; 4] {
    [
        format!("can create and bind to a service instance using {plan}"),
        format!("manipulate a database as expected using {plan} plan"),
        format!("can unbind from a service instance using {plan}"),
        format!("can destroy a service instance using {plan}"),
    ]
}
