use std::sync::Arc;
use std::time::Duration;

use forwarder::{ForwardOutcome, Forwarder, InMemoryDedupStore, RetryPolicy, SourceName, Timestamp};
use listener::{
    handle_invocation, ErrorReport, InvocationError, InvocationLoop, LambdaRuntimeClient,
    RuntimeApiError, REPORT_MARGIN,
};
use secrets::StaticCredentialProvider;
use serde_json::json;
use webhook::HttpWebhookClient;
use wiremock::matchers::{body_json, body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const NEXT: &str = "/2018-06-01/runtime/invocation/next";

fn source() -> SourceName {
    SourceName::new("prod_cron_webhooks").unwrap()
}

fn forwarder() -> Arc<Forwarder> {
    Arc::new(Forwarder::new(
        Arc::new(InMemoryDedupStore::new()),
        Arc::new(StaticCredentialProvider::new("s3cr3t")),
        Arc::new(HttpWebhookClient::new(None).unwrap()),
    ))
}

fn deadline_in(offset: Duration) -> String {
    let millis = Timestamp::now().as_datetime().timestamp_millis() + offset.as_millis() as i64;
    millis.to_string()
}

fn event(webhook: &MockServer, id: &str) -> serde_json::Value {
    json!({
        "id": id,
        "endpoint": format!("{}/hook", webhook.uri()),
        "shared_secret_arn": "arn:s1",
    })
}

async fn serve_invocation(runtime: &MockServer, request_id: &str, deadline: String, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(NEXT))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Lambda-Runtime-Aws-Request-Id", request_id)
                .insert_header("Lambda-Runtime-Deadline-Ms", deadline.as_str())
                .insert_header(
                    "Lambda-Runtime-Invoked-Function-Arn",
                    "arn:aws:lambda:us-east-1:123456789012:function:prod_cron_webhooks",
                )
                .set_body_json(body),
        )
        .mount(runtime)
        .await;
}

#[tokio::test]
async fn forwarded_invocation_reports_success() {
    let runtime = MockServer::start().await;
    let webhook = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(header("X-Cron-Auth", "s3cr3t"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&webhook)
        .await;
    serve_invocation(&runtime, "req-1", deadline_in(Duration::from_secs(30)), event(&webhook, "t1")).await;
    Mock::given(method("POST"))
        .and(path("/2018-06-01/runtime/invocation/req-1/response"))
        .and(body_json(json!({ "outcome": "forwarded", "status": 200 })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&runtime)
        .await;

    let invocations = InvocationLoop::new(LambdaRuntimeClient::new(&runtime.uri()), forwarder(), source());
    let report = invocations.process_next().await.unwrap();

    assert_eq!(report.request_id, "req-1");
    assert_eq!(report.result.unwrap(), ForwardOutcome::Forwarded { status: 200 });
}

#[tokio::test]
async fn invalid_event_reports_error_without_posting() {
    let runtime = MockServer::start().await;
    let webhook = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&webhook)
        .await;
    serve_invocation(
        &runtime,
        "req-2",
        deadline_in(Duration::from_secs(30)),
        json!({ "endpoint": format!("{}/hook", webhook.uri()), "shared_secret_arn": "arn:s1" }),
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/2018-06-01/runtime/invocation/req-2/error"))
        .and(body_partial_json(json!({ "errorType": "InvalidTriggerEvent" })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&runtime)
        .await;

    let invocations = InvocationLoop::new(LambdaRuntimeClient::new(&runtime.uri()), forwarder(), source());
    let report = invocations.process_next().await.unwrap();

    let err = report.result.unwrap_err();
    assert_eq!(err.kind(), "InvalidTriggerEvent");
}

#[tokio::test]
async fn slow_webhook_reports_deadline_exceeded() {
    let runtime = MockServer::start().await;
    let webhook = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&webhook)
        .await;
    serve_invocation(&runtime, "req-3", deadline_in(Duration::from_secs(1)), event(&webhook, "t1")).await;
    Mock::given(method("POST"))
        .and(path("/2018-06-01/runtime/invocation/req-3/error"))
        .and(body_partial_json(json!({ "errorType": "DeadlineExceeded" })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&runtime)
        .await;

    let invocations = InvocationLoop::new(LambdaRuntimeClient::new(&runtime.uri()), forwarder(), source());
    let report = invocations.process_next().await.unwrap();

    let err = report.result.unwrap_err();
    assert!(matches!(err, InvocationError::DeadlineExceeded { .. }));
    assert_eq!(err.retry_policy(), RetryPolicy::NonRetryable);
}

#[tokio::test]
async fn missing_request_id_is_a_runtime_failure() {
    let runtime = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(NEXT))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Lambda-Runtime-Deadline-Ms", "1700000000000")
                .set_body_json(json!({})),
        )
        .mount(&runtime)
        .await;

    let err = LambdaRuntimeClient::new(&runtime.uri())
        .next_invocation()
        .await
        .unwrap_err();
    assert!(matches!(err, RuntimeApiError::MissingHeader("Lambda-Runtime-Aws-Request-Id")));
}

#[tokio::test]
async fn next_invocation_parses_headers() {
    let runtime = MockServer::start().await;
    serve_invocation(&runtime, "req-4", "1700000000000".into(), json!({ "id": "t1" })).await;

    let invocation = LambdaRuntimeClient::new(&runtime.uri())
        .next_invocation()
        .await
        .unwrap();
    assert_eq!(invocation.request_id, "req-4");
    assert_eq!(invocation.deadline, Timestamp::from_epoch_millis(1_700_000_000_000).unwrap());
    assert!(invocation.function_arn.unwrap().ends_with(":function:prod_cron_webhooks"));
    assert_eq!(invocation.payload, json!({ "id": "t1" }));
}

#[tokio::test]
async fn init_error_is_posted_to_init_endpoint() {
    let runtime = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2018-06-01/runtime/init/error"))
        .and(body_json(json!({ "errorMessage": "no cache nodes", "errorType": "Configuration" })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&runtime)
        .await;

    LambdaRuntimeClient::new(&runtime.uri())
        .report_init_error(&ErrorReport {
            message: "no cache nodes".into(),
            kind: "Configuration".into(),
        })
        .await
        .unwrap();
}

// ---------------------------------------------------------------------------
// handle_invocation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn redelivered_event_is_duplicate() {
    let webhook = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&webhook)
        .await;

    let forwarder = forwarder();
    let first = handle_invocation(&forwarder, source(), event(&webhook, "t1"), None).await.unwrap();
    let second = handle_invocation(&forwarder, source(), event(&webhook, "t1"), None).await.unwrap();

    assert_eq!(first, ForwardOutcome::Forwarded { status: 200 });
    assert_eq!(second, ForwardOutcome::Duplicate);
}

#[tokio::test]
async fn expired_deadline_does_no_work() {
    let webhook = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&webhook)
        .await;

    let past = Timestamp::from_epoch_millis(1_000).unwrap();
    let err = handle_invocation(&forwarder(), source(), event(&webhook, "t1"), Some(past))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "DeadlineExceeded");
}

#[tokio::test]
async fn deadline_inside_report_margin_does_no_work() {
    let webhook = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&webhook)
        .await;

    let millis = Timestamp::now().as_datetime().timestamp_millis() + (REPORT_MARGIN.as_millis() / 2) as i64;
    let deadline = Timestamp::from_epoch_millis(millis).unwrap();
    let err = handle_invocation(&forwarder(), source(), event(&webhook, "t1"), Some(deadline))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "DeadlineExceeded");
}

#[tokio::test]
async fn store_outage_is_retryable_other_failures_are_not() {
    let webhook = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&webhook)
        .await;

    let err = handle_invocation(&forwarder(), source(), event(&webhook, "t1"), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "ForwardFailed");
    assert_eq!(err.retry_policy(), RetryPolicy::NonRetryable);

    let err = InvocationError::Forward(forwarder::ForwardError::StoreUnavailable(
        forwarder::StoreError::Unavailable {
            node: "10.0.0.1:11211".into(),
            message: "connection refused".into(),
        },
    ));
    assert_eq!(err.retry_policy(), RetryPolicy::Retryable);
}

#[tokio::test]
async fn non_object_payload_is_invalid() {
    let err = handle_invocation(&forwarder(), source(), json!("not an event"), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "InvalidTriggerEvent");
}
