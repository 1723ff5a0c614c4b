//! Pipeline lifecycle integration tests.
//!
//! These tests verify the processing pipeline with mock processors and sinks:
//! - Stage ordering for processing and finalization
//! - Processors that drop or buffer resources
//! - Mutations made by processors reaching every sink
//! - Error propagation from processors and sinks

use serde_json::{json, Value};

use bulkfhir_core::{
    bulkfhir::ResourceType,
    processing::{Pipeline, ProcessingError, ResourceTypeFilter, TracingSink},
    testing::{fixtures, CallLog, MockProcessor, MockSink, ProcessorMode},
};

fn bytes(resource: &Value) -> Vec<u8> {
    serde_json::to_vec(resource).unwrap()
}

#[tokio::test]
async fn test_buffering_processor_flushes_on_finalize() {
    let log = CallLog::new();
    let buffer = MockProcessor::new("buffer", log.clone()).with_mode(ProcessorMode::Buffer);
    let sink = MockSink::new("sink", log.clone());
    let pipeline = Pipeline::new(
        vec![
            Box::new(buffer.clone()),
            Box::new(MockProcessor::new("tail", log.clone())),
        ],
        vec![Box::new(sink.clone())],
    );

    for id in ["1", "2"] {
        pipeline
            .process(ResourceType::Patient, "src", bytes(&fixtures::patient(id)))
            .await
            .unwrap();
    }
    assert!(sink.written().await.is_empty());
    assert_eq!(buffer.buffered_count().await, 2);

    pipeline.finalize().await.unwrap();

    let written = sink.written().await;
    assert_eq!(written.len(), 2);
    assert_eq!(
        log.entries().await,
        vec![
            "buffer.process",
            "buffer.process",
            "buffer.finalize",
            "tail.process",
            "sink.write",
            "tail.process",
            "sink.write",
            "tail.finalize",
            "sink.finalize",
        ]
    );
}

#[tokio::test]
async fn test_dropping_processor_stops_resource() {
    let log = CallLog::new();
    let sink = MockSink::new("sink", log.clone());
    let pipeline = Pipeline::new(
        vec![
            Box::new(MockProcessor::new("drop", log.clone()).with_mode(ProcessorMode::Drop)),
            Box::new(MockProcessor::new("after", log.clone())),
        ],
        vec![Box::new(sink.clone())],
    );

    pipeline
        .process(ResourceType::Patient, "src", bytes(&fixtures::patient("1")))
        .await
        .unwrap();

    assert_eq!(log.entries().await, vec!["drop.process"]);
    assert!(sink.written().await.is_empty());
}

#[tokio::test]
async fn test_every_sink_sees_processor_mutations() {
    let log = CallLog::new();
    let s1 = MockSink::new("s1", log.clone());
    let s2 = MockSink::new("s2", log.clone());
    let pipeline = Pipeline::new(
        vec![
            Box::new(MockProcessor::new("tag", log.clone()).with_field("tag", json!("a"))),
            Box::new(MockProcessor::new("retag", log.clone()).with_field("tag", json!("b"))),
        ],
        vec![Box::new(s1.clone()), Box::new(s2.clone())],
    );

    pipeline
        .process(
            ResourceType::Coverage,
            "coverage.ndjson",
            bytes(&fixtures::coverage("c1", "p1")),
        )
        .await
        .unwrap();

    for sink in [&s1, &s2] {
        let written = sink.written().await;
        assert_eq!(written.len(), 1);
        assert!(written[0].stabilized);
        assert_eq!(written[0].resource_type, ResourceType::Coverage);
        assert_eq!(written[0].source_url, "coverage.ndjson");

        let value: Value = serde_json::from_slice(&written[0].json).unwrap();
        assert_eq!(value["tag"], json!("b"));
        assert_eq!(value["beneficiary"]["reference"], json!("Patient/p1"));
    }
}

#[tokio::test]
async fn test_untouched_resource_bytes_pass_through() {
    let log = CallLog::new();
    let sink = MockSink::new("sink", log.clone());
    let pipeline = Pipeline::new(
        vec![Box::new(MockProcessor::new("noop", log.clone()))],
        vec![Box::new(sink.clone())],
    );

    // Whitespace is preserved since nothing decoded the resource.
    let raw = br#"{ "resourceType": "Patient", "id": "1" }"#.to_vec();
    pipeline
        .process(ResourceType::Patient, "src", raw.clone())
        .await
        .unwrap();

    assert_eq!(sink.written().await[0].json, raw);
}

#[tokio::test]
async fn test_processor_error_propagates() {
    let log = CallLog::new();
    let failing = MockProcessor::new("failing", log.clone());
    failing
        .set_process_error(Some(ProcessingError::stage("failing", "bad resource")))
        .await;
    let sink = MockSink::new("sink", log.clone());
    let pipeline = Pipeline::new(vec![Box::new(failing)], vec![Box::new(sink.clone())]);

    let err = pipeline
        .process(ResourceType::Patient, "src", bytes(&fixtures::patient("1")))
        .await
        .unwrap_err();

    assert_eq!(err, ProcessingError::stage("failing", "bad resource"));
    assert!(sink.written().await.is_empty());
}

#[tokio::test]
async fn test_invalid_json_fails_when_decoded() {
    let log = CallLog::new();
    let sink = MockSink::new("sink", log.clone());
    let pipeline = Pipeline::new(
        vec![Box::new(
            MockProcessor::new("tag", log.clone()).with_field("tag", json!(1)),
        )],
        vec![Box::new(sink.clone())],
    );

    let err = pipeline
        .process(ResourceType::Patient, "src", b"not json".to_vec())
        .await
        .unwrap_err();

    assert!(matches!(err, ProcessingError::Decode(_)));
    assert!(sink.written().await.is_empty());
}

#[tokio::test]
async fn test_sink_finalize_error_stops_later_sinks() {
    let log = CallLog::new();
    let s1 = MockSink::new("s1", log.clone());
    s1.set_finalize_error(Some(ProcessingError::stage("s1", "flush failed")))
        .await;
    let pipeline = Pipeline::new(
        vec![],
        vec![Box::new(s1), Box::new(MockSink::new("s2", log.clone()))],
    );

    let err = pipeline.finalize().await.unwrap_err();
    assert_eq!(err, ProcessingError::stage("s1", "flush failed"));
    assert_eq!(log.entries().await, vec!["s1.finalize"]);
}

#[tokio::test]
async fn test_filter_and_tracing_sink() {
    let log = CallLog::new();
    let sink = MockSink::new("sink", log.clone());
    let pipeline = Pipeline::new(
        vec![Box::new(ResourceTypeFilter::new([ResourceType::Coverage]))],
        vec![Box::new(TracingSink::new()), Box::new(sink.clone())],
    );

    pipeline
        .process(ResourceType::Patient, "p", bytes(&fixtures::patient("1")))
        .await
        .unwrap();
    pipeline
        .process(ResourceType::Coverage, "c", bytes(&fixtures::coverage("c1", "1")))
        .await
        .unwrap();
    pipeline.finalize().await.unwrap();

    let written = sink.written().await;
    assert_eq!(written.len(), 1);
    assert_eq!(written[0].resource_type, ResourceType::Coverage);
    assert_eq!(log.entries().await, vec!["sink.write", "sink.finalize"]);
}
