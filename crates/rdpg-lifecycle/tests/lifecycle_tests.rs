use rdpg_lifecycle::{LifecycleOrchestrator, PlatformCommand, SmokeConfig, StepOutcome, SuiteReport};
use rdpg_test_utils::{fake_foundation, fast_config, FakeDatabaseApp, FakePlatform, FaultMode};
use std::sync::Arc;

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("rdpg_lifecycle=debug")
        .with_test_writer()
        .try_init();
}

async fn run_suite(
    plans: &[&str],
    app: &Arc<FakeDatabaseApp>,
    platform: &Arc<FakePlatform>,
) -> SuiteReport {
    init_logging();
    let orchestrator = LifecycleOrchestrator::new(
        fast_config(plans),
        Arc::clone(platform) as _,
        Arc::clone(app) as _,
    );
    orchestrator.run().await
}

fn outcome<'a>(report: &'a SuiteReport, name: &str) -> &'a StepOutcome {
    &report
        .step(name)
        .unwrap_or_else(|| panic!("missing step {name:?}"))
        .outcome
}

fn failure_of(report: &SuiteReport, name: &str) -> String {
    match outcome(report, name) {
        StepOutcome::Failed(msg) => msg.clone(),
        other => panic!("expected {name:?} to fail, got {other:?}"),
    }
}

fn deletes(c: &PlatformCommand) -> bool {
    matches!(c, PlatformCommand::DeleteService { .. })
}

fn unbinds(c: &PlatformCommand) -> bool {
    matches!(c, PlatformCommand::UnbindService { .. })
}

#[tokio::test(start_paused = true)]
async fn healthy_service_passes_every_step() {
    let (app, platform) = fake_foundation();
    let report = run_suite(&["shared", "dedicated"], &app, &platform).await;

    assert!(report.passed(), "{}", report.generate_text());
    for plan in ["shared", "dedicated"] {
        for name in [
            format!("can create and bind to a service instance using {plan}"),
            format!("manipulate a database as expected using {plan} plan"),
            format!("can unbind from a service instance using {plan}"),
            format!("can destroy a service instance using {plan}"),
        ] {
            assert_eq!(outcome(&report, &name), &StepOutcome::Passed, "{name}");
        }
    }
    assert_eq!(outcome(&report, "can delete the application"), &StepOutcome::Passed);

    assert_eq!(platform.live_instances(), 0);
    assert_eq!(platform.live_bindings(), 0);
    assert_eq!(platform.live_apps(), 0);
    assert!(!app.is_started());
    assert!(app.requests() > 0);
}

#[tokio::test(start_paused = true)]
async fn each_instance_is_cleaned_up_exactly_once() {
    let (app, platform) = fake_foundation();
    run_suite(&["shared", "dedicated"], &app, &platform).await;

    assert_eq!(platform.count(unbinds), 2);
    assert_eq!(platform.count(deletes), 2);
    assert_eq!(
        platform.count(|c| matches!(c, PlatformCommand::DeleteApp { force: true, .. })),
        1
    );

    let instances: Vec<String> = platform
        .commands()
        .into_iter()
        .filter_map(|c| match c {
            PlatformCommand::CreateService { instance, .. } => Some(instance),
            _ => None,
        })
        .collect();
    assert_eq!(instances.len(), 2);
    assert_ne!(instances[0], instances[1]);
    for instance in &instances {
        assert!(app.schemas(instance).is_none(), "{instance} was not destroyed");
    }
}

#[tokio::test(start_paused = true)]
async fn rows_that_survive_delete_are_a_violation() {
    let app = FakeDatabaseApp::with_fault(FaultMode::IgnoreDeletes);
    let platform = FakePlatform::new(Arc::clone(&app));
    let report = run_suite(&["shared"], &app, &platform).await;

    let msg = failure_of(&report, "manipulate a database as expected using shared plan");
    assert!(msg.contains("observed forbidden"), "{msg}");
    assert_eq!(
        outcome(&report, "can destroy a service instance using shared"),
        &StepOutcome::Passed
    );
    assert_eq!(platform.live_instances(), 0);
}

#[tokio::test(start_paused = true)]
async fn lost_updates_time_out() {
    let app = FakeDatabaseApp::with_fault(FaultMode::DropUpdates);
    let platform = FakePlatform::new(Arc::clone(&app));
    let report = run_suite(&["shared"], &app, &platform).await;

    let msg = failure_of(&report, "manipulate a database as expected using shared plan");
    assert!(msg.contains("timed out"), "{msg}");
    assert!(msg.contains("last observed"), "{msg}");
    assert_eq!(platform.live_instances(), 0);
}

#[tokio::test(start_paused = true)]
async fn schema_left_in_catalog_is_a_violation() {
    let app = FakeDatabaseApp::with_fault(FaultMode::KeepDroppedSchemas);
    let platform = FakePlatform::new(Arc::clone(&app));
    let report = run_suite(&["shared"], &app, &platform).await;

    let msg = failure_of(&report, "manipulate a database as expected using shared plan");
    assert!(msg.contains("observed forbidden"), "{msg}");
    assert!(msg.contains("`[`"), "{msg}");
}

#[tokio::test(start_paused = true)]
async fn stale_value_after_update_is_a_violation() {
    let app = FakeDatabaseApp::with_fault(FaultMode::StaleReadsAfterUpdate);
    let platform = FakePlatform::new(Arc::clone(&app));
    let report = run_suite(&["shared"], &app, &platform).await;

    let msg = failure_of(&report, "manipulate a database as expected using shared plan");
    assert!(msg.contains("observed forbidden"), "{msg}");
    assert!(msg.contains(",\"0\"]"), "{msg}");
    assert_eq!(
        outcome(&report, "can destroy a service instance using shared"),
        &StepOutcome::Passed
    );
}

#[tokio::test(start_paused = true)]
async fn table_that_survives_drop_times_out() {
    let app = FakeDatabaseApp::with_fault(FaultMode::KeepDroppedTables);
    let platform = FakePlatform::new(Arc::clone(&app));
    let report = run_suite(&["shared"], &app, &platform).await;

    let msg = failure_of(&report, "manipulate a database as expected using shared plan");
    assert!(msg.contains("timed out"), "{msg}");
    assert!(msg.contains("`FAILURE`"), "{msg}");
    assert_eq!(platform.live_instances(), 0);
}

#[tokio::test(start_paused = true)]
async fn rejected_plan_skips_its_cleanup_only() {
    let (app, platform) = fake_foundation();
    platform.fail_plan("dedicated");
    let report = run_suite(&["shared", "dedicated"], &app, &platform).await;

    assert!(!report.passed());
    assert_eq!(
        outcome(&report, "manipulate a database as expected using shared plan"),
        &StepOutcome::Passed
    );

    let msg = failure_of(&report, "can create and bind to a service instance using dedicated");
    assert!(msg.contains("create-service rdpg dedicated"), "{msg}");
    let msg = failure_of(&report, "manipulate a database as expected using dedicated plan");
    assert!(msg.contains("precondition"), "{msg}");
    assert!(matches!(
        outcome(&report, "can unbind from a service instance using dedicated"),
        StepOutcome::Skipped(_)
    ));
    assert!(matches!(
        outcome(&report, "can destroy a service instance using dedicated"),
        StepOutcome::Skipped(_)
    ));

    assert_eq!(platform.count(unbinds), 1);
    assert_eq!(platform.count(deletes), 1);
    assert_eq!(platform.live_instances(), 0);
}

#[tokio::test(start_paused = true)]
async fn failed_unbind_still_attempts_destroy_once() {
    let (app, platform) = fake_foundation();
    platform.fail_when(unbinds);
    let report = run_suite(&["shared"], &app, &platform).await;

    assert!(report
        .step("can unbind from a service instance using shared")
        .unwrap()
        .failed());
    // The platform refuses to delete a bound instance.
    assert!(report
        .step("can destroy a service instance using shared")
        .unwrap()
        .failed());
    assert_eq!(platform.count(unbinds), 1);
    assert_eq!(platform.count(deletes), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_restart_is_still_cleaned_up() {
    let (app, platform) = fake_foundation();
    platform.fail_when(|c| matches!(c, PlatformCommand::Push { options, .. } if !options.no_start));
    let report = run_suite(&["shared"], &app, &platform).await;

    let msg = failure_of(&report, "can create and bind to a service instance using shared");
    assert!(msg.contains("push"), "{msg}");
    assert_eq!(
        outcome(&report, "can unbind from a service instance using shared"),
        &StepOutcome::Passed
    );
    assert_eq!(
        outcome(&report, "can destroy a service instance using shared"),
        &StepOutcome::Passed
    );
    assert_eq!(platform.live_instances(), 0);
}

fn isolated_config(plans: &[&str]) -> SmokeConfig {
    let mut config = fast_config(plans);
    config.api = Some("https://api.example.com".to_string());
    config.admin_user = Some("admin".to_string());
    config.admin_password = Some("hunter2".to_string());
    config.skip_ssl_validation = true;
    config
}

#[tokio::test(start_paused = true)]
async fn isolated_org_is_created_and_removed() {
    init_logging();
    let (app, platform) = fake_foundation();
    let config = isolated_config(&["shared"]);

    let report = LifecycleOrchestrator::new(config, Arc::clone(&platform) as _, Arc::clone(&app) as _)
        .run()
        .await;
    assert!(report.passed(), "{}", report.generate_text());

    let commands = platform.commands();
    assert!(matches!(
        &commands[0],
        PlatformCommand::Api { skip_ssl_validation: true, .. }
    ));
    assert!(matches!(
        &commands[1],
        PlatformCommand::Auth { password, .. } if password == "hunter2"
    ));
    assert!(matches!(&commands[2], PlatformCommand::CreateOrg { org } if org.starts_with("rdpg-postgres-smoke-test-")));
    assert!(matches!(commands.last(), Some(PlatformCommand::DeleteOrg { .. })));
    assert_eq!(
        outcome(&report, "can delete the isolated org"),
        &StepOutcome::Passed
    );
}

#[tokio::test(start_paused = true)]
async fn failed_org_setup_provisions_nothing() {
    init_logging();
    let (app, platform) = fake_foundation();
    platform.fail_when(|c| matches!(c, PlatformCommand::Target { .. }));

    let report = LifecycleOrchestrator::new(
        isolated_config(&["shared", "dedicated"]),
        Arc::clone(&platform) as _,
        Arc::clone(&app) as _,
    )
    .run()
    .await;

    let msg = failure_of(&report, "can set up an isolated org and space");
    assert!(msg.contains("target"), "{msg}");
    assert_eq!(platform.count(|c| matches!(c, PlatformCommand::Push { .. })), 0);
    assert_eq!(
        platform.count(|c| matches!(c, PlatformCommand::CreateService { .. })),
        0
    );
    assert_eq!(platform.count(|c| matches!(c, PlatformCommand::DeleteApp { .. })), 0);

    let mut skipped = vec![
        "can push the application".to_string(),
        "can delete the application".to_string(),
    ];
    for plan in ["shared", "dedicated"] {
        skipped.push(format!("can create and bind to a service instance using {plan}"));
        skipped.push(format!("manipulate a database as expected using {plan} plan"));
        skipped.push(format!("can unbind from a service instance using {plan}"));
        skipped.push(format!("can destroy a service instance using {plan}"));
    }
    for name in &skipped {
        assert!(
            matches!(outcome(&report, name), StepOutcome::Skipped(_)),
            "{name}"
        );
    }

    assert!(matches!(
        platform.commands().last(),
        Some(PlatformCommand::DeleteOrg { org }) if org.starts_with("rdpg-postgres-smoke-test-")
    ));
    assert_eq!(
        outcome(&report, "can delete the isolated org"),
        &StepOutcome::Passed
    );
}

#[tokio::test(start_paused = true)]
async fn run_pass_reports_provisioning_flags() {
    init_logging();
    let (app, platform) = fake_foundation();
    let mut orchestrator = LifecycleOrchestrator::new(
        fast_config(&["shared"]),
        Arc::clone(&platform) as _,
        Arc::clone(&app) as _,
    );

    // Without the initial push there is no app to bind to.
    let state = orchestrator.run_pass("shared").await;
    assert!(state.is_created());
    assert!(!state.is_bound());
    assert!(!state.is_running());
    assert_eq!(platform.live_instances(), 0);
    assert!(orchestrator
        .report()
        .step("can create and bind to a service instance using shared")
        .unwrap()
        .failed());
}
