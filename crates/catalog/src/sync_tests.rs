// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::agent::AgentService;
use crate::test_support::{wait_for, FakeCatalog, ScriptRun, ScriptedExecutor};
use wharf_model::CheckStatus;

fn spawn_sync() -> (Arc<FakeCatalog>, ServiceSync) {
    spawn_sync_with(SyncConfig::default())
}

fn spawn_sync_with(config: SyncConfig) -> (Arc<FakeCatalog>, ServiceSync) {
    let catalog = Arc::new(FakeCatalog::new());
    let (sync, runner) = ServiceSync::with_config(catalog.clone(), config);
    tokio::spawn(runner.run());
    (catalog, sync)
}

fn web_resolver(label: &str) -> (String, u16) {
    match label {
        "web" => ("10.0.0.1".to_string(), 8080),
        _ => ("127.0.0.1".to_string(), 9000),
    }
}

fn http_check(name: &str, interval: Duration) -> ServiceCheck {
    ServiceCheck {
        name: name.to_string(),
        kind: CheckKind::Http,
        path: "/v1/status/leader".to_string(),
        interval,
        timeout: Duration::from_secs(2),
        ..Default::default()
    }
}

fn script_check(interval: Duration) -> ServiceCheck {
    ServiceCheck {
        name: "script".to_string(),
        kind: CheckKind::Script,
        command: "/bin/check".to_string(),
        interval,
        timeout: Duration::from_secs(1),
        ..Default::default()
    }
}

fn echo_task() -> Task {
    Task {
        name: "echo".to_string(),
        services: vec![Service {
            name: "svc".to_string(),
            port_label: "web".to_string(),
            tags: vec!["a".to_string(), "b".to_string()],
            checks: vec![],
        }],
    }
}

#[tokio::test(start_paused = true)]
async fn agent_registration_end_to_end() {
    let (catalog, sync) = spawn_sync();
    let service = Service {
        name: "nomad".to_string(),
        port_label: "127.0.0.1:4646".to_string(),
        tags: vec!["http".to_string()],
        checks: vec![http_check("health", Duration::from_secs(10))],
    };

    sync.register_agent("server", &[service.clone()]).await.unwrap();

    wait_for("agent service registered", || {
        catalog.service("_nomad-server-nomad-http").is_some()
    })
    .await;

    let registered = catalog.service("_nomad-server-nomad-http").unwrap();
    assert_eq!(registered.address, "127.0.0.1");
    assert_eq!(registered.port, 4646);
    assert_eq!(registered.tags, vec!["http"]);

    let cid = check_id("_nomad-server-nomad-http", &service.checks[0]);
    wait_for("agent check registered", || catalog.check(&cid).is_some()).await;
    assert_eq!(catalog.check(&cid).unwrap().service_id, "_nomad-server-nomad-http");
}

#[tokio::test(start_paused = true)]
async fn agent_script_checks_rejected() {
    let (catalog, sync) = spawn_sync();
    let service = Service {
        name: "nomad".to_string(),
        port_label: "127.0.0.1:4646".to_string(),
        checks: vec![script_check(Duration::from_secs(5))],
        ..Default::default()
    };

    let err = sync.register_agent("client", &[service]).await.unwrap_err();
    assert!(
        err.to_string().contains("agent checks do not support scripts"),
        "got {}",
        err
    );

    // Nothing was submitted, so the loop never writes.
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(catalog.writes(), 0);
    assert!(catalog.service_ids().is_empty());
}

#[tokio::test(start_paused = true)]
async fn agent_port_label_must_be_explicit() {
    let (catalog, sync) = spawn_sync();
    let service = Service {
        name: "nomad".to_string(),
        port_label: "web".to_string(),
        ..Default::default()
    };

    let err = sync.register_agent("server", &[service]).await.unwrap_err();
    assert!(matches!(err, RegisterError::ServicePortLabel { .. }), "got {}", err);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(catalog.writes(), 0);
}

#[tokio::test(start_paused = true)]
async fn register_then_remove_task() {
    let (catalog, sync) = spawn_sync();
    let task = echo_task();

    sync.register_task("abcd", &task, &web_resolver, None).await.unwrap();

    wait_for("task service registered", || {
        catalog.service("_nomad-executor-abcd-echo-svc-a-b").is_some()
    })
    .await;
    let registered = catalog.service("_nomad-executor-abcd-echo-svc-a-b").unwrap();
    assert_eq!(registered.address, "10.0.0.1");
    assert_eq!(registered.port, 8080);
    assert_eq!(registered.tags, vec!["a", "b"]);

    sync.remove_task("abcd", &task).await;
    wait_for("task service deregistered", || {
        catalog.service("_nomad-executor-abcd-echo-svc-a-b").is_none()
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn update_task_with_changed_check_touches_only_the_check() {
    let (catalog, sync) = spawn_sync();

    let mut existing = echo_task();
    existing.services[0].checks = vec![http_check("health", Duration::from_secs(10))];
    let mut updated = existing.clone();
    updated.services[0].checks[0].interval = Duration::from_secs(20);

    sync.register_task("alloc1", &existing, &web_resolver, None).await.unwrap();

    let sid = task_service_id("alloc1", "echo", &existing.services[0]);
    let old_cid = check_id(&sid, &existing.services[0].checks[0]);
    let new_cid = check_id(&sid, &updated.services[0].checks[0]);
    assert_ne!(old_cid, new_cid);

    wait_for("initial convergence", || catalog.check(&old_cid).is_some()).await;
    let writes_before = catalog.writes();

    sync.update_task("alloc1", &existing, &updated, &web_resolver, None).await.unwrap();

    wait_for("check replaced", || {
        catalog.check(&new_cid).is_some() && catalog.check(&old_cid).is_none()
    })
    .await;

    // One deregister plus one register; the service itself was not touched.
    assert_eq!(catalog.writes(), writes_before + 2);
    assert!(catalog.service(&sid).is_some());
}

#[tokio::test(start_paused = true)]
async fn update_task_deregisters_removed_services_with_their_checks() {
    let (catalog, sync) = spawn_sync();

    let doomed = Service {
        name: "doomed".to_string(),
        port_label: "web".to_string(),
        checks: vec![http_check("health", Duration::from_secs(10))],
        ..Default::default()
    };
    let survivor = Service {
        name: "survivor".to_string(),
        port_label: "web".to_string(),
        ..Default::default()
    };
    let existing = Task {
        name: "echo".to_string(),
        services: vec![doomed.clone(), survivor.clone()],
    };
    let updated = Task { name: "echo".to_string(), services: vec![survivor.clone()] };

    sync.register_task("alloc1", &existing, &web_resolver, None).await.unwrap();

    let doomed_id = task_service_id("alloc1", "echo", &doomed);
    let doomed_cid = check_id(&doomed_id, &doomed.checks[0]);
    let survivor_id = task_service_id("alloc1", "echo", &survivor);

    wait_for("initial convergence", || catalog.check(&doomed_cid).is_some()).await;
    let writes_before = catalog.writes();

    sync.update_task("alloc1", &existing, &updated, &web_resolver, None).await.unwrap();

    wait_for("doomed service gone", || catalog.service(&doomed_id).is_none()).await;
    assert!(catalog.check(&doomed_cid).is_none());
    assert!(catalog.service(&survivor_id).is_some());
    assert_eq!(catalog.writes(), writes_before + 2);
}

#[tokio::test(start_paused = true)]
async fn update_task_registers_new_services() {
    let (catalog, sync) = spawn_sync();

    let existing = echo_task();
    let mut updated = existing.clone();
    updated.services.push(Service {
        name: "extra".to_string(),
        port_label: "web".to_string(),
        ..Default::default()
    });

    sync.register_task("alloc1", &existing, &web_resolver, None).await.unwrap();
    let extra_id = task_service_id("alloc1", "echo", &updated.services[1]);
    wait_for("initial convergence", || {
        catalog.service("_nomad-executor-alloc1-echo-svc-a-b").is_some()
    })
    .await;

    sync.update_task("alloc1", &existing, &updated, &web_resolver, None).await.unwrap();
    wait_for("extra service registered", || catalog.service(&extra_id).is_some()).await;
    assert!(catalog.service("_nomad-executor-alloc1-echo-svc-a-b").is_some());
}

#[tokio::test(start_paused = true)]
async fn script_probe_lifecycle() {
    let (catalog, sync) = spawn_sync();
    let exec = Arc::new(ScriptedExecutor::always(ScriptRun::Exit(2, "broken".to_string())));
    exec.push(ScriptRun::Exit(0, "ok".to_string()));

    let mut task = echo_task();
    task.services[0].checks = vec![script_check(Duration::from_secs(5))];
    let sid = task_service_id("abcd", "echo", &task.services[0]);
    let cid = check_id(&sid, &task.services[0].checks[0]);

    sync.register_task("abcd", &task, &web_resolver, Some(exec.clone() as Arc<dyn ScriptExecutor>))
        .await
        .unwrap();

    wait_for("ttl check registered", || catalog.check(&cid).is_some()).await;
    wait_for("first refresh", || !catalog.ttl_updates().is_empty()).await;
    assert_eq!(catalog.ttl_updates()[0].status, CheckStatus::Passing);
    assert_eq!(catalog.ttl_updates()[0].check_id, cid);

    wait_for("critical refresh", || {
        catalog.ttl_updates().iter().any(|u| u.status == CheckStatus::Critical)
    })
    .await;

    sync.remove_task("abcd", &task).await;
    wait_for("check deregistered", || catalog.check(&cid).is_none()).await;

    // The probe was cancelled with the check; executions stop.
    tokio::time::sleep(Duration::from_secs(6)).await;
    let settled = exec.runs();
    tokio::time::sleep(Duration::from_secs(15)).await;
    assert_eq!(exec.runs(), settled, "probe kept executing after removal");
}

#[tokio::test(start_paused = true)]
async fn script_checks_require_an_executor() {
    let (catalog, sync) = spawn_sync();
    let mut task = echo_task();
    task.services[0].checks = vec![script_check(Duration::from_secs(5))];

    let err = sync.register_task("abcd", &task, &web_resolver, None).await.unwrap_err();
    assert!(matches!(err, RegisterError::ScriptsUnsupported));
    assert_eq!(err.to_string(), "driver doesn't support script checks");

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(catalog.writes(), 0, "rejected call must not submit a partial batch");
}

#[tokio::test(start_paused = true)]
async fn update_task_applies_script_check_policy() {
    let (catalog, sync) = spawn_sync();
    let existing = echo_task();
    let mut updated = existing.clone();
    updated.services[0].checks = vec![script_check(Duration::from_secs(5))];

    sync.register_task("abcd", &existing, &web_resolver, None).await.unwrap();
    wait_for("initial convergence", || !catalog.service_ids().is_empty()).await;
    let writes_before = catalog.writes();

    let err =
        sync.update_task("abcd", &existing, &updated, &web_resolver, None).await.unwrap_err();
    assert!(matches!(err, RegisterError::ScriptsUnsupported));

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(catalog.writes(), writes_before);
}

#[tokio::test(start_paused = true)]
async fn retry_after_catalog_failure() {
    let (catalog, sync) = spawn_sync();
    catalog.fail_queries(true);

    sync.register_task("abcd", &echo_task(), &web_resolver, None).await.unwrap();

    // The first cycle fails on the service query; nothing is written and
    // the retry timer is armed.
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(catalog.writes(), 0);

    catalog.fail_queries(false);
    wait_for("convergence after retry", || {
        catalog.service("_nomad-executor-abcd-echo-svc-a-b").is_some()
    })
    .await;
    assert_eq!(catalog.writes(), 1);
}

#[tokio::test(start_paused = true)]
async fn reconcile_is_idempotent() {
    let (catalog, sync) = spawn_sync();
    let mut task = echo_task();
    task.services[0].checks = vec![http_check("health", Duration::from_secs(10))];

    sync.register_task("abcd", &task, &web_resolver, None).await.unwrap();
    wait_for("convergence", || catalog.writes() == 2).await;

    // Same desired state again: the next cycle sees no differences.
    sync.register_task("abcd", &task, &web_resolver, None).await.unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(catalog.writes(), 2);
}

#[tokio::test(start_paused = true)]
async fn empty_services_issue_no_writes() {
    let (catalog, sync) = spawn_sync();
    let task = Task { name: "idle".to_string(), services: vec![] };

    sync.register_task("abcd", &task, &web_resolver, None).await.unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(catalog.writes(), 0);
}

#[tokio::test(start_paused = true)]
async fn unmanaged_entries_are_left_alone() {
    let (catalog, sync) = spawn_sync();
    catalog.seed_service(AgentService {
        id: "redis".to_string(),
        service: "redis".to_string(),
        tags: vec![],
        address: "127.0.0.1".to_string(),
        port: 6379,
    });

    let task = echo_task();
    sync.register_task("abcd", &task, &web_resolver, None).await.unwrap();
    wait_for("task service registered", || {
        catalog.service("_nomad-executor-abcd-echo-svc-a-b").is_some()
    })
    .await;
    assert!(catalog.service("redis").is_some());

    sync.remove_task("abcd", &task).await;
    wait_for("task service deregistered", || {
        catalog.service("_nomad-executor-abcd-echo-svc-a-b").is_none()
    })
    .await;
    assert!(catalog.service("redis").is_some());
}

#[tokio::test(start_paused = true)]
async fn shutdown_sweeps_agent_registrations() {
    let (catalog, sync) = spawn_sync();
    let service = Service {
        name: "nomad".to_string(),
        port_label: "127.0.0.1:4646".to_string(),
        tags: vec!["http".to_string()],
        checks: vec![http_check("health", Duration::from_secs(10))],
    };
    let cid = check_id("_nomad-server-nomad-http", &service.checks[0]);

    sync.register_agent("server", &[service]).await.unwrap();
    wait_for("agent entries registered", || {
        catalog.service("_nomad-server-nomad-http").is_some() && catalog.check(&cid).is_some()
    })
    .await;

    sync.shutdown().await.unwrap();
    assert!(catalog.service("_nomad-server-nomad-http").is_none());
    assert!(catalog.check(&cid).is_none());
}

#[tokio::test(start_paused = true)]
async fn shutdown_twice_is_a_noop() {
    let (_catalog, sync) = spawn_sync();
    sync.shutdown().await.unwrap();
    sync.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn shutdown_waits_out_running_probes() {
    let (catalog, sync) = spawn_sync();
    let exec = Arc::new(ScriptedExecutor::always(ScriptRun::Hang));

    let mut task = echo_task();
    task.services[0].checks = vec![script_check(Duration::from_secs(5))];

    sync.register_task("abcd", &task, &web_resolver, Some(exec.clone() as Arc<dyn ScriptExecutor>))
        .await
        .unwrap();
    wait_for("probe running", || exec.runs() > 0).await;
    assert!(!catalog.check_ids().is_empty());

    // Cancellation frees the hanging execution, so this finishes well
    // inside the shutdown deadline.
    sync.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn submissions_after_shutdown_do_not_commit() {
    let (catalog, sync) = spawn_sync();
    sync.shutdown().await.unwrap();

    let writes = catalog.writes();
    let submitted = tokio::time::timeout(
        Duration::from_secs(1),
        sync.register_task("abcd", &echo_task(), &web_resolver, None),
    )
    .await;
    assert!(submitted.is_ok(), "submission during shutdown must return promptly");
    submitted.unwrap().unwrap();

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(catalog.writes(), writes);
    assert!(catalog.service("_nomad-executor-abcd-echo-svc-a-b").is_none());
}
