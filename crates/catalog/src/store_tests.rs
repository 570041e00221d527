// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::agent::{CheckTarget, ServiceRegistration};
use crate::probe::ScriptProbe;
use crate::test_support::{FakeCatalog, ScriptRun, ScriptedExecutor};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use wharf_model::{CheckKind, ServiceCheck};

fn service_reg(id: &str) -> ServiceRegistration {
    ServiceRegistration {
        id: id.to_string(),
        name: "svc".to_string(),
        tags: vec![],
        address: "127.0.0.1".to_string(),
        port: 80,
    }
}

fn check_reg(id: &str, service_id: &str) -> CheckRegistration {
    CheckRegistration {
        id: id.to_string(),
        service_id: service_id.to_string(),
        name: "check".to_string(),
        status: None,
        interval: "10s".to_string(),
        timeout: "2s".to_string(),
        target: CheckTarget::Tcp { addr: "127.0.0.1:80".to_string() },
    }
}

#[test]
fn merge_registers_services_and_checks() {
    let mut store = DesiredState::default();
    store.merge(Batch {
        reg_services: vec![service_reg("s1"), service_reg("s2")],
        reg_checks: vec![check_reg("c1", "s1")],
        ..Default::default()
    });
    assert_eq!(store.services.len(), 2);
    assert_eq!(store.checks.len(), 1);
}

#[test]
fn merge_last_registration_wins() {
    let mut store = DesiredState::default();
    let mut updated = service_reg("s1");
    updated.port = 9999;
    store.merge(Batch { reg_services: vec![service_reg("s1")], ..Default::default() });
    store.merge(Batch { reg_services: vec![updated], ..Default::default() });
    assert_eq!(store.services["s1"].port, 9999);
}

#[test]
fn merge_is_idempotent_for_identical_registrations() {
    let mut store = DesiredState::default();
    let batch = || Batch {
        reg_services: vec![service_reg("s1")],
        reg_checks: vec![check_reg("c1", "s1")],
        ..Default::default()
    };
    store.merge(batch());
    store.merge(batch());
    assert_eq!(store.services.len(), 1);
    assert_eq!(store.checks.len(), 1);
}

#[test]
fn merge_deregistrations_follow_registrations() {
    // Same id on both sides of one batch: the deregistration is applied
    // second, so the entry does not survive.
    let mut store = DesiredState::default();
    store.merge(Batch {
        reg_services: vec![service_reg("s1")],
        dereg_services: vec!["s1".to_string()],
        ..Default::default()
    });
    assert!(store.services.is_empty());
}

#[test]
fn merge_ignores_unknown_deregistrations() {
    let mut store = DesiredState::default();
    store.merge(Batch {
        dereg_services: vec!["ghost".to_string()],
        dereg_checks: vec!["ghost".to_string()],
        ..Default::default()
    });
    assert!(store.services.is_empty());
    assert!(store.checks.is_empty());
}

#[tokio::test(start_paused = true)]
async fn merge_check_deregistration_stops_running_probe() {
    let catalog = Arc::new(FakeCatalog::new());
    let exec = Arc::new(ScriptedExecutor::always(ScriptRun::Exit(0, "ok".to_string())));
    let check = ServiceCheck {
        kind: CheckKind::Script,
        command: "/bin/check".to_string(),
        interval: std::time::Duration::from_secs(1),
        timeout: std::time::Duration::from_secs(1),
        ..Default::default()
    };
    let probe = ScriptProbe::new(
        "c1".to_string(),
        check,
        exec.clone(),
        catalog.clone(),
        CancellationToken::new(),
    );

    let mut store = DesiredState::default();
    store.checks.insert("c1".to_string(), check_reg("c1", "s1"));
    store.probes.insert("c1".to_string(), probe.clone());
    store.running.insert("c1".to_string(), probe.start());

    crate::test_support::wait_for("first probe run", || exec.runs() > 0).await;

    store.merge(Batch { dereg_checks: vec!["c1".to_string()], ..Default::default() });
    assert!(store.checks.is_empty());
    assert!(store.probes.is_empty());
    assert!(store.running.is_empty());

    // The probe winds down; give any in-flight execution a beat, then
    // confirm no further runs are scheduled.
    tokio::time::sleep(std::time::Duration::from_secs(2)).await;
    let settled = exec.runs();
    tokio::time::sleep(std::time::Duration::from_secs(10)).await;
    assert_eq!(exec.runs(), settled, "probe kept executing after deregistration");
}
