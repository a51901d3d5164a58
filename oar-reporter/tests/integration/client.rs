// Copyright (c) The oar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    fake_service::{FakeService, unreachable_base_url},
    logs::CapturedLogs,
};
use oar_metadata::{Analysis, Outcome, Query, Record, RecordError, Resolution};
use oar_reporter::{
    client::{Client, ClientBuilder, DeleteOutcome},
    errors::ReportFailure,
    log_sink::LogSink,
    retry::RetryPolicy,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::Duration;

fn client(service: &FakeService) -> Client {
    ClientBuilder::new(service.base_url())
        .retry_policy(RetryPolicy::new_without_delay(2))
        .log_sink(LogSink::none())
        .build()
}

fn passed(summary: &str) -> Record {
    let mut record = Record::new();
    record
        .set_summary(summary)
        .set_outcome(Outcome::Passed)
        .set_analysis(Analysis::TrueNegative)
        .set_resolution(Resolution::NotNeeded);
    record
}

fn failed(summary: &str) -> Record {
    let mut record = Record::new();
    record
        .set_summary(summary)
        .set_outcome(Outcome::Failed)
        .set_analysis(Analysis::NotAnalyzed)
        .set_resolution(Resolution::Unresolved);
    record
}

#[test]
fn add_and_list() {
    let service = FakeService::start();
    let client = client(&service);

    let mut record = passed("test_login");
    record.insert("build", "b-17").unwrap();
    assert_eq!(client.add(&record).unwrap(), 1);
    assert_eq!(client.add(&failed("test_logout")).unwrap(), 2);

    let stored = service.record(1).unwrap();
    assert_eq!(stored.summary.as_deref(), Some("test_login"));
    assert_eq!(stored.get("build"), Some(&json!("b-17")));

    let all = client.list(&Query::new(), 0, None).unwrap();
    assert_eq!(all.count, 2);
    assert_eq!(all.tests.len(), 2);

    let failed_only = client
        .list(&Query::new().with_outcomes([Outcome::Failed]), 0, None)
        .unwrap();
    assert_eq!(failed_only.count, 1);
    assert_eq!(failed_only.tests[0].id, 2);

    let second_page = client.list(&Query::new(), 1, Some(1)).unwrap();
    assert_eq!(second_page.count, 2);
    assert_eq!(second_page.tests.len(), 1);
    assert_eq!(second_page.tests[0].id, 2);
}

#[test]
fn list_limit_above_maximum_is_rejected() {
    let service = FakeService::start();
    let failure = client(&service)
        .list(&Query::new(), 0, Some(1001))
        .unwrap_err();
    assert_eq!(failure.status(), Some(400));
}

#[test]
fn add_validates_locally() {
    let service = FakeService::start();
    let client = client(&service);

    let mut record = failed("test_broken");
    record.set_analysis(Analysis::TrueNegative);
    let failure = client.add(&record).unwrap_err();
    assert!(
        matches!(
            failure,
            ReportFailure::Validation(RecordError::InconsistentVerdict { .. })
        ),
        "{failure:?}"
    );

    let failure = client.add(&passed("  ")).unwrap_err();
    assert!(
        matches!(failure, ReportFailure::Validation(RecordError::BlankSummary)),
        "{failure:?}"
    );

    assert!(service.requests().is_empty());
}

#[test]
fn enrich_updates_fields() {
    let service = FakeService::start();
    let client = client(&service);
    let id = client.add(&failed("test_flaky")).unwrap();

    let mut update = Record::new();
    update
        .set_id(id)
        .set_analysis(Analysis::FalsePositive)
        .set_resolution(Resolution::TestFixed);
    client.enrich(&update).unwrap();

    let stored = service.record(id).unwrap();
    assert_eq!(stored.summary.as_deref(), Some("test_flaky"));
    assert_eq!(stored.analysis, Some(Analysis::FalsePositive));
    assert_eq!(stored.resolution, Some(Resolution::TestFixed));

    update.set_id(99);
    let failure = client.enrich(&update).unwrap_err();
    assert_eq!(failure.status(), Some(404));
}

#[test]
fn enrich_by_query_updates_matching_records() {
    let service = FakeService::start();
    let client = client(&service);
    client.add(&failed("test_a")).unwrap();
    client.add(&failed("test_b")).unwrap();
    client.add(&passed("test_c")).unwrap();

    let mut update = Record::new();
    update.insert("ticket", "OAR-12").unwrap();
    client
        .enrich_by_query(&update, &Query::new().with_outcomes([Outcome::Failed]))
        .unwrap();

    assert_eq!(service.record(1).unwrap().get("ticket"), Some(&json!("OAR-12")));
    assert_eq!(service.record(2).unwrap().get("ticket"), Some(&json!("OAR-12")));
    assert_eq!(service.record(3).unwrap().get("ticket"), None);
}

#[test]
fn delete_distinguishes_nothing_matched() {
    let service = FakeService::start();
    let client = client(&service);
    client.add(&passed("test_a")).unwrap();
    client.add(&passed("test_b")).unwrap();
    client.add(&failed("test_c")).unwrap();

    assert_eq!(client.delete_by_ids(&[]).unwrap(), DeleteOutcome::NothingMatched);
    assert!(
        !service.requests().iter().any(|r| r.starts_with("DELETE")),
        "empty id list must not reach the service"
    );

    assert_eq!(client.delete_by_ids(&[1, 42]).unwrap(), DeleteOutcome::Applied);
    assert_eq!(client.delete_by_ids(&[1]).unwrap(), DeleteOutcome::NothingMatched);
    assert_eq!(service.record_count(), 2);

    let query = Query::new().with_summaries(["test_c"]);
    assert_eq!(client.delete_by_query(&query).unwrap(), DeleteOutcome::Applied);
    assert_eq!(
        client.delete_by_query(&query).unwrap(),
        DeleteOutcome::NothingMatched
    );
    assert_eq!(service.record_count(), 1);
}

#[test]
fn encode_query_matches_local_codec() {
    let service = FakeService::start();
    let client = client(&service);

    let query = Query::new()
        .with_ids([1, 2])
        .with_analyses([Analysis::NotAnalyzed]);
    let remote = client.encode_query(&query).unwrap();
    assert_eq!(remote, query.to_token().unwrap());
    assert_eq!(remote.decode().unwrap(), query);
}

#[test]
fn retries_transient_statuses() {
    let service = FakeService::start();
    let logs = CapturedLogs::default();
    let client = ClientBuilder::new(service.base_url())
        .retry_policy(RetryPolicy::new_without_delay(2))
        .log_sink(logs.sink())
        .build();

    service.inject_failures([503, 502]);
    let result = client.list(&Query::new(), 0, None).unwrap();
    assert_eq!(result.count, 0);
    assert_eq!(service.requests().len(), 3);
    assert!(logs.contents().contains("retrying"), "{}", logs.contents());

    service.inject_failures([500, 500, 500]);
    let failure = client.list(&Query::new(), 0, None).unwrap_err();
    assert!(
        matches!(
            failure,
            ReportFailure::Rejected {
                status: 500,
                retries_exhausted: true,
                ..
            }
        ),
        "{failure:?}"
    );
    assert_eq!(service.requests().len(), 6);
}

#[test]
fn create_is_not_retried_after_reaching_the_service() {
    let service = FakeService::start();
    let client = client(&service);

    service.inject_failures([503]);
    let failure = client.add(&passed("test_once")).unwrap_err();
    assert!(
        matches!(
            failure,
            ReportFailure::Rejected {
                status: 503,
                retries_exhausted: false,
                ..
            }
        ),
        "{failure:?}"
    );
    assert_eq!(service.requests(), vec!["POST /test".to_owned()]);
    assert_eq!(service.record_count(), 0);
}

#[test]
fn rejection_carries_service_message() {
    let service = FakeService::start();
    let logs = CapturedLogs::default();
    let client = ClientBuilder::new(service.base_url())
        .retry_policy(RetryPolicy::new_without_delay(0))
        .log_sink(logs.sink())
        .build();

    service.inject_failures([400]);
    let failure = client.delete_by_ids(&[1]).unwrap_err();
    match &failure {
        ReportFailure::Rejected {
            status, message, ..
        } => {
            assert_eq!(*status, 400);
            assert_eq!(message.as_deref(), Some("injected failure"));
        }
        other => panic!("unexpected failure: {other:?}"),
    }

    let contents = logs.contents();
    assert!(contents.contains("ERROR"), "{contents}");
    assert!(contents.contains("injected failure"), "{contents}");
}

#[test]
fn unreachable_service_soft_fails() {
    let logs = CapturedLogs::default();
    let client = ClientBuilder::new(unreachable_base_url())
        .retry_policy(RetryPolicy::new_without_delay(2))
        .timeout(Duration::from_secs(2))
        .log_sink(logs.sink())
        .build();

    let failure = client.list(&Query::new(), 0, None).unwrap_err();
    assert!(
        matches!(failure, ReportFailure::Transport { attempts: 3, .. }),
        "{failure:?}"
    );
    assert_eq!(failure.status(), None);

    let failure = client.add(&passed("test_offline")).unwrap_err();
    assert!(
        matches!(failure, ReportFailure::Transport { .. }),
        "{failure:?}"
    );
    assert!(logs.contents().contains("failed to reach oar service"), "{}", logs.contents());
}
