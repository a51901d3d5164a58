// Copyright (c) The oar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runs `oar` commands against an in-process service.

#[allow(dead_code)]
#[path = "../../../oar-reporter/tests/integration/fake_service.rs"]
mod fake_service;

use cargo_oar::{ExpectedError, OarApp};
use clap::Parser;
use fake_service::FakeService;
use oar_metadata::{Analysis, Outcome, QueryResult, Record, Resolution};
use oar_reporter::client::Client;
use pretty_assertions::assert_eq;
use serde_json::json;

fn oar(service: &FakeService, args: &[&str]) -> Result<String, ExpectedError> {
    let base_url = service.base_url();
    let global = ["oar", "--color", "never", "--config", "none", "--host", base_url.as_str()];
    let app = OarApp::try_parse_from(global.into_iter().chain(args.iter().copied())).unwrap();
    let output = app.init_output();
    let mut out = Vec::new();
    app.exec(output, &mut out)?;
    Ok(String::from_utf8(out).unwrap())
}

/// Stores one passed, one failed and one more passed record, with ids 1, 2 and 3.
fn seed(service: &FakeService) {
    let client = Client::new(service.base_url());
    for (summary, outcome, analysis) in [
        ("login works", Outcome::Passed, Analysis::NotAnalyzed),
        ("checkout works", Outcome::Failed, Analysis::TruePositive),
        ("search works", Outcome::Passed, Analysis::TrueNegative),
    ] {
        let mut record = Record::new();
        record
            .set_summary(summary)
            .set_outcome(outcome)
            .set_analysis(analysis);
        client.add(&record).unwrap();
    }
}

fn last_request(service: &FakeService) -> String {
    service.requests().pop().unwrap()
}

#[test]
fn list_prints_matching_page() {
    let service = FakeService::start();
    seed(&service);

    let output = oar(&service, &["list", "--outcome", "Failed"]).unwrap();
    let result: QueryResult = serde_json::from_str(&output).unwrap();
    assert_eq!(result.count, 1);
    assert_eq!(result.tests[0].summary.as_deref(), Some("checkout works"));

    let output = oar(&service, &["list", "--offset", "1", "--limit", "1"]).unwrap();
    let result: QueryResult = serde_json::from_str(&output).unwrap();
    assert_eq!(result.count, 3);
    assert_eq!(result.tests.len(), 1);
    assert_eq!(result.tests[0].id, 2);
}

#[test]
fn delete_with_only_ids_sends_the_id_list() {
    let service = FakeService::start();
    seed(&service);

    let output = oar(&service, &["delete", "--id", "1", "--id", "3"]).unwrap();
    assert_eq!(output, "deleted matching results\n");
    assert_eq!(last_request(&service), "DELETE /tests");
    assert_eq!(service.record_count(), 1);
    assert!(service.record(2).is_some());

    let output = oar(&service, &["delete", "--id", "1"]).unwrap();
    assert_eq!(output, "no results matched\n");
}

#[test]
fn delete_with_a_filter_sends_a_query() {
    let service = FakeService::start();
    seed(&service);

    let output = oar(&service, &["delete", "--id", "1", "--outcome", "Passed"]).unwrap();
    assert_eq!(output, "deleted matching results\n");
    assert!(
        last_request(&service).starts_with("DELETE /tests?query="),
        "{:?}",
        service.requests()
    );
    assert_eq!(service.record_count(), 2);
    assert!(service.record(1).is_none());

    let output = oar(&service, &["delete", "--all"]).unwrap();
    assert_eq!(output, "deleted matching results\n");
    assert_eq!(service.record_count(), 0);
}

#[test]
fn enrich_one_id_updates_that_record() {
    let service = FakeService::start();
    seed(&service);

    let output = oar(&service, &["enrich", "--id", "2", "--resolution", "KnownIssue"]).unwrap();
    assert_eq!(output, "updated\n");
    assert_eq!(last_request(&service), "PATCH /test");
    assert_eq!(
        service.record(2).unwrap().resolution,
        Some(Resolution::KnownIssue)
    );
    assert_eq!(service.record(1).unwrap().resolution, None);
}

#[test]
fn enrich_many_ids_updates_by_query() {
    let service = FakeService::start();
    seed(&service);

    oar(&service, &["enrich", "--id", "1", "--id", "3", "--field", "owner=qa"]).unwrap();
    assert!(
        last_request(&service).starts_with("PATCH /tests?query="),
        "{:?}",
        service.requests()
    );
    assert_eq!(service.record(1).unwrap().get("owner"), Some(&json!("qa")));
    assert_eq!(service.record(3).unwrap().get("owner"), Some(&json!("qa")));
    assert_eq!(service.record(2).unwrap().get("owner"), None);
}

#[test]
fn enrich_missing_record_is_a_remote_failure() {
    let service = FakeService::start();

    let error = oar(&service, &["enrich", "--id", "9", "--summary", "gone"]).unwrap_err();
    assert!(
        matches!(error, ExpectedError::Remote { operation: "enrich", .. }),
        "{error:?}"
    );
    assert_eq!(error.process_exit_code(), cargo_oar::OarExitCode::REMOTE_FAILURE);
}
