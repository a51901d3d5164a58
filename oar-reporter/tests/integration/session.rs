// Copyright (c) The oar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    fake_service::{FakeService, unreachable_base_url},
    logs::CapturedLogs,
};
use camino_tempfile::Utf8TempDir;
use indoc::formatdoc;
use oar_metadata::{
    Analysis, BaseRecord, FieldKind, FieldSpec, Outcome, RecordVariant, VariantSpec,
};
use oar_reporter::{
    classify::{Phase, PhaseResult},
    config::{ConfigLocation, ConfigWarnings, OarConfig},
    report::ReportSnapshot,
    retry::RetryPolicy,
    session::ReportSession,
};
use pretty_assertions::assert_eq;
use std::{collections::BTreeSet, time::Duration};

struct LoadTest;

impl RecordVariant for LoadTest {
    const SPEC: VariantSpec =
        VariantSpec::new("load", &[FieldSpec::new("maxRPS", FieldKind::Number)]);
}

struct NoWarnings;

impl ConfigWarnings for NoWarnings {
    fn unknown_config_keys(
        &mut self,
        _config_file: Option<&camino::Utf8Path>,
        unknown: &BTreeSet<String>,
    ) {
        panic!("unexpected unknown keys: {unknown:?}");
    }
}

fn load_config(temp_dir: &Utf8TempDir, host: &str) -> OarConfig {
    let path = temp_dir.path().join("oar-config.toml");
    std::fs::write(
        &path,
        formatdoc! {r#"
                host = "{}"
                send_results = true
                output_dir = "{}"
                retries = 1
                timeout = "2s"
            "#,
            host,
            temp_dir.path().join("results"),
        },
    )
    .unwrap();
    OarConfig::from_sources(
        ConfigLocation::Explicit(&path),
        std::iter::empty::<(String, String)>(),
        &mut NoWarnings,
    )
    .unwrap()
}

#[test]
fn full_run_reports_and_writes_file() {
    let service = FakeService::start();
    let temp_dir = Utf8TempDir::new().unwrap();
    let config = load_config(&temp_dir, &service.base_url());
    assert_eq!(config.retries, RetryPolicy::new_without_delay(1));
    assert_eq!(config.timeout, Duration::from_secs(2));

    let logs = CapturedLogs::default();
    let mut session = ReportSession::new(config, logs.sink());

    let mut case = session.start_test::<BaseRecord>("test_checkout");
    case.record_phase(Phase::Setup, PhaseResult::Passed);
    case.record_phase(Phase::Call, PhaseResult::Passed);
    case.record_phase(Phase::Teardown, PhaseResult::Passed);
    let first = session.finish_test(case).unwrap();
    assert_eq!(first.id, 1);

    let mut case = session.start_test::<LoadTest>("test_load");
    case.record_mut().insert("maxRPS", 1200).unwrap();
    case.record_phase(Phase::Setup, PhaseResult::Failed);
    let second = session.finish_test(case).unwrap();
    assert_eq!(second.id, 2);
    assert_eq!(second.outcome, Some(Outcome::Failed));
    assert_eq!(second.analysis, Some(Analysis::FalsePositive));

    let stored = service.record(2).unwrap();
    assert_eq!(stored.get("type"), Some(&serde_json::json!("load")));
    assert_eq!(stored.get("maxRPS"), Some(&serde_json::json!(1200)));

    let path = session.finish().unwrap();
    let snapshot = ReportSnapshot::load(&path).unwrap();
    assert_eq!(snapshot.summary.passed_ids, vec![1]);
    assert_eq!(snapshot.summary.failed_ids, vec![2]);
    assert_eq!(snapshot.tests.len(), 2);
    assert!(snapshot.completed_time.is_some());

    let contents = logs.contents();
    assert!(contents.contains("failed ids: [2]"), "{contents}");
}

#[test]
fn unreachable_service_does_not_fail_the_run() {
    let temp_dir = Utf8TempDir::new().unwrap();
    let config = load_config(&temp_dir, &unreachable_base_url());
    let logs = CapturedLogs::default();
    let mut session = ReportSession::new(config, logs.sink());

    let mut case = session.start_test::<BaseRecord>("test_offline");
    case.record_phase(Phase::Call, PhaseResult::Passed);
    let record = session.finish_test(case).unwrap();
    assert_eq!(record.id, 0);
    assert_eq!(record.outcome, Some(Outcome::Passed));

    assert_eq!(session.report().unwrap().tests().len(), 1);
    assert!(session.finish().is_some());
    assert!(
        logs.contents().contains("failed to reach oar service"),
        "{}",
        logs.contents()
    );
}
