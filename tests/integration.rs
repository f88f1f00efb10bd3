//! Integration tests for datasource-worker.
//!
//! Each test plays the host: it writes the session preamble and the request
//! over an in-memory duplex, reads what the worker sends back and answers the
//! tail reply.

use std::path::PathBuf;
use std::time::Duration;

use bytes::BytesMut;
use datasource_worker::codec::MsgPackCodec;
use datasource_worker::options::OptionsMap;
use datasource_worker::protocol::{
    put_blob, put_bool, put_int, put_long, put_null, put_str, special_lengths, ErrorEnvelope,
    ProtocolReader,
};
use datasource_worker::schema::{DataType, SchemaSpec, StructField, StructType};
use datasource_worker::session::runtime_version;
use datasource_worker::source::{
    ClassReference, DataSource, NameAccessor, PluginError, SourceFactory, SourceInstance,
};
use datasource_worker::{Accumulators, ErrorKind, Outcome, Worker, WorkerConfig};
use serde::Serialize;
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};

#[derive(Serialize)]
struct Foo {
    x: String,
}

impl DataSource for Foo {
    fn new(options: OptionsMap) -> Result<Self, PluginError> {
        Ok(Foo {
            x: options.get("x").unwrap_or_default().to_string(),
        })
    }

    fn schema(&self) -> Result<Option<SchemaSpec>, PluginError> {
        Ok(Some(
            StructType::new(vec![StructField::new("col", DataType::Integer)]).into(),
        ))
    }
}

#[derive(Serialize)]
struct Lines;

impl DataSource for Lines {
    fn name() -> String {
        "lines".to_string()
    }

    fn new(_options: OptionsMap) -> Result<Self, PluginError> {
        Ok(Lines)
    }

    fn schema(&self) -> Result<Option<SchemaSpec>, PluginError> {
        Ok(Some("value STRING".into()))
    }
}

#[derive(Serialize)]
struct Strict;

impl DataSource for Strict {
    fn new(options: OptionsMap) -> Result<Self, PluginError> {
        if options.contains_key("path") {
            Ok(Strict)
        } else {
            Err(PluginError::new("option 'path' is required"))
        }
    }
}

#[derive(Serialize)]
struct Exploding;

impl DataSource for Exploding {
    fn new(_options: OptionsMap) -> Result<Self, PluginError> {
        panic!("constructor blew up")
    }
}

/// Records an accumulator update every time it builds an instance.
struct Counting {
    accumulators: Accumulators,
}

impl SourceFactory for Counting {
    fn name_accessor(&self) -> NameAccessor {
        NameAccessor::TypeLevel("counting".to_string())
    }

    fn create(&self, _options: OptionsMap) -> Result<Box<dyn SourceInstance>, PluginError> {
        self.accumulators.add(3, 7);
        Ok(Box::new(Lines))
    }
}

/// What the host observed.
#[derive(Debug)]
enum HostView {
    Created {
        instance: Vec<u8>,
        ddl: i32,
        schema: String,
        updates: Vec<(i64, serde_json::Value)>,
        echo: i32,
    },
    Failed {
        envelope: ErrorEnvelope,
        trailing: bool,
    },
}

fn preamble(buf: &mut BytesMut) {
    put_str(buf, &runtime_version()).unwrap();
    // files
    put_str(buf, "/staged").unwrap();
    put_int(buf, 0);
    // broadcasts
    put_int(buf, 0);
    put_bool(buf, false);
}

fn put_request(
    buf: &mut BytesMut,
    reference: &ClassReference,
    provider: &str,
    schema: Option<&str>,
    options: &[(&str, &str)],
) {
    put_blob(buf, &reference.encode().unwrap()).unwrap();
    put_str(buf, provider).unwrap();
    put_bool(buf, schema.is_some());
    if let Some(json) = schema {
        put_str(buf, json).unwrap();
    }
    put_int(buf, options.len() as i32);
    for (k, v) in options {
        put_str(buf, k).unwrap();
        put_str(buf, v).unwrap();
    }
}

fn request(path: &str, provider: &str, schema: Option<&str>, options: &[(&str, &str)]) -> BytesMut {
    let mut buf = BytesMut::new();
    preamble(&mut buf);
    put_request(&mut buf, &ClassReference::of_type(path), provider, schema, options);
    buf
}

async fn host(stream: DuplexStream, request: BytesMut, tail: i32) -> HostView {
    let (read_half, mut write_half) = tokio::io::split(stream);
    write_half.write_all(&request).await.unwrap();
    write_half.flush().await.unwrap();

    let mut reader = ProtocolReader::new(read_half);
    let first = reader.read_int().await.unwrap();
    if first == special_lengths::EXCEPTION_THROWN {
        let envelope = ErrorEnvelope::from_json(&reader.read_blob().await.unwrap()).unwrap();
        let trailing = reader.read_int().await.is_ok();
        return HostView::Failed { envelope, trailing };
    }

    let mut instance = vec![0u8; first as usize];
    reader.inner_mut().read_exact(&mut instance).await.unwrap();
    let ddl = reader.read_int().await.unwrap();
    let schema = reader.read_string().await.unwrap();

    let count = reader.read_int().await.unwrap();
    let mut updates = Vec::new();
    for _ in 0..count {
        updates.push(MsgPackCodec::decode(&reader.read_blob().await.unwrap()).unwrap());
    }

    write_half.write_i32(tail).await.unwrap();
    write_half.flush().await.unwrap();
    let echo = reader.read_int().await.unwrap();

    HostView::Created {
        instance,
        ddl,
        schema,
        updates,
        echo,
    }
}

async fn exchange<H>(
    worker: &mut Worker<H>,
    request: BytesMut,
    tail: i32,
) -> (Outcome, HostView)
where
    H: datasource_worker::session::SessionHooks,
{
    let (worker_side, host_side) = duplex(64 * 1024);
    let (read_half, write_half) = tokio::io::split(worker_side);
    let (outcome, view) = tokio::join!(
        worker.serve(read_half, write_half),
        host(host_side, request, tail)
    );
    (outcome.unwrap(), view)
}

fn worker() -> Worker {
    Worker::builder()
        .source::<Foo>("tests.Foo")
        .source::<Lines>("tests.Lines")
        .source::<Strict>("tests.Strict")
        .source::<Exploding>("tests.Exploding")
        .build()
}

fn expect_failure(view: HostView) -> ErrorEnvelope {
    match view {
        HostView::Failed { envelope, trailing } => {
            assert!(!trailing, "nothing may follow the error envelope");
            envelope
        }
        other => panic!("expected an error envelope, got {:?}", other),
    }
}

/// Create a source end to end and let the host reuse the worker.
#[tokio::test]
async fn test_create_structured_source_and_reuse() {
    let mut worker = worker();
    let (outcome, view) = exchange(
        &mut worker,
        request("tests.Foo", "FOO", None, &[("x", "1")]),
        special_lengths::END_OF_STREAM,
    )
    .await;

    assert_eq!(outcome, Outcome::Reuse);
    assert_eq!(outcome.code(), 0);
    match view {
        HostView::Created {
            instance,
            ddl,
            schema,
            updates,
            echo,
        } => {
            let decoded: serde_json::Value = MsgPackCodec::decode(&instance).unwrap();
            assert_eq!(decoded, serde_json::json!({"x": "1"}));
            assert_eq!(ddl, 0);
            assert_eq!(
                schema,
                r#"{"fields":[{"metadata":{},"name":"col","nullable":true,"type":"integer"}],"type":"struct"}"#
            );
            assert!(updates.is_empty());
            assert_eq!(echo, special_lengths::END_OF_STREAM);
        }
        other => panic!("unexpected reply {:?}", other),
    }
}

#[tokio::test]
async fn test_discard_when_host_does_not_end_stream() {
    let mut worker = worker();
    let (outcome, view) = exchange(&mut worker, request("tests.Foo", "foo", None, &[]), 0).await;

    assert_eq!(outcome, Outcome::Discard);
    assert_eq!(outcome.code(), 255);
    match view {
        HostView::Created { echo, .. } => assert_eq!(echo, special_lengths::END_OF_DATA_SECTION),
        other => panic!("unexpected reply {:?}", other),
    }
}

#[tokio::test]
async fn test_caller_schema_wins() {
    let caller = r#"{"type":"struct","fields":[{"name":"name","type":"string","nullable":false,"metadata":{}}]}"#;
    let mut worker = worker();
    let (outcome, view) = exchange(
        &mut worker,
        request("tests.Lines", "lines", Some(caller), &[]),
        special_lengths::END_OF_STREAM,
    )
    .await;

    assert_eq!(outcome, Outcome::Reuse);
    match view {
        HostView::Created { ddl, schema, .. } => {
            assert_eq!(ddl, 0);
            assert_eq!(
                schema,
                r#"{"fields":[{"metadata":{},"name":"name","nullable":false,"type":"string"}],"type":"struct"}"#
            );
        }
        other => panic!("unexpected reply {:?}", other),
    }
}

#[tokio::test]
async fn test_ddl_schema_flag() {
    let mut worker = worker();
    let (_, view) = exchange(
        &mut worker,
        request("tests.Lines", " Lines ", None, &[]),
        special_lengths::END_OF_STREAM,
    )
    .await;

    match view {
        HostView::Created { ddl, schema, .. } => {
            assert_eq!(ddl, 1);
            assert_eq!(schema, "value STRING");
        }
        other => panic!("unexpected reply {:?}", other),
    }
}

#[tokio::test]
async fn test_provider_mismatch() {
    let mut worker = worker();
    let (outcome, view) = exchange(
        &mut worker,
        request("tests.Foo", "bar", None, &[]),
        special_lengths::END_OF_STREAM,
    )
    .await;

    assert_eq!(outcome, Outcome::Failed(ErrorKind::TypeMismatch));
    let envelope = expect_failure(view);
    assert_eq!(envelope.error_class, "DATA_SOURCE_TYPE_MISMATCH");
    assert_eq!(envelope.message_parameters["expected"], "provider with name Foo");
    assert_eq!(envelope.message_parameters["actual"], "'bar'");
}

#[tokio::test]
async fn test_reference_that_is_not_a_type() {
    let mut buf = BytesMut::new();
    preamble(&mut buf);
    put_request(&mut buf, &ClassReference::of_value("int"), "foo", None, &[]);

    let mut worker = worker();
    let (outcome, view) = exchange(&mut worker, buf, special_lengths::END_OF_STREAM).await;

    assert_eq!(outcome, Outcome::Failed(ErrorKind::TypeMismatch));
    let envelope = expect_failure(view);
    assert_eq!(envelope.message_parameters["expected"], "a subclass of DataSource");
}

#[tokio::test]
async fn test_null_class_blob() {
    let mut buf = BytesMut::new();
    preamble(&mut buf);
    put_null(&mut buf);

    let mut worker = worker();
    let (outcome, view) = exchange(&mut worker, buf, special_lengths::END_OF_STREAM).await;
    assert_eq!(outcome, Outcome::Failed(ErrorKind::TypeMismatch));
    expect_failure(view);
}

#[tokio::test]
async fn test_constructor_error_sends_one_envelope() {
    let mut worker = worker();
    let (outcome, view) = exchange(
        &mut worker,
        request("tests.Strict", "strict", None, &[]),
        special_lengths::END_OF_STREAM,
    )
    .await;

    assert_eq!(outcome, Outcome::Failed(ErrorKind::DataSourceFailure));
    assert_eq!(outcome.code(), 255);
    let envelope = expect_failure(view);
    assert_eq!(envelope.error_class, "DATA_SOURCE_FAILURE");
    assert!(envelope.message.contains("option 'path' is required"));
}

#[tokio::test]
async fn test_constructor_panic_is_contained() {
    let mut worker = worker();
    let (outcome, view) = exchange(
        &mut worker,
        request("tests.Exploding", "exploding", None, &[]),
        special_lengths::END_OF_STREAM,
    )
    .await;

    assert_eq!(outcome, Outcome::Failed(ErrorKind::DataSourceFailure));
    let envelope = expect_failure(view);
    assert!(envelope.message.contains("constructor blew up"));
}

#[tokio::test]
async fn test_missing_schema_accessor() {
    let mut worker = worker();
    let (outcome, _) = exchange(
        &mut worker,
        request("tests.Strict", "strict", None, &[("path", "/data")]),
        special_lengths::END_OF_STREAM,
    )
    .await;
    assert_eq!(outcome, Outcome::Failed(ErrorKind::DataSourceFailure));
}

#[tokio::test]
async fn test_non_struct_caller_schema() {
    let mut worker = worker();
    let (outcome, view) = exchange(
        &mut worker,
        request("tests.Foo", "foo", Some(r#""integer""#), &[]),
        special_lengths::END_OF_STREAM,
    )
    .await;

    assert_eq!(outcome, Outcome::Failed(ErrorKind::TypeMismatch));
    let envelope = expect_failure(view);
    assert_eq!(
        envelope.message_parameters["expected"],
        "the user-defined schema to be a 'StructType'"
    );
}

#[tokio::test]
async fn test_accumulator_updates_flushed() {
    let builder = Worker::builder();
    let accumulators = builder.accumulators();
    let mut worker = builder
        .factory(
            "tests.Counting",
            Counting {
                accumulators: accumulators.clone(),
            },
        )
        .build();
    accumulators.add(99, "stale");

    let (outcome, view) = exchange(
        &mut worker,
        request("tests.Counting", "counting", None, &[]),
        special_lengths::END_OF_STREAM,
    )
    .await;

    assert_eq!(outcome, Outcome::Reuse);
    match view {
        HostView::Created { updates, .. } => {
            assert_eq!(updates, vec![(3, serde_json::json!(7))]);
        }
        other => panic!("unexpected reply {:?}", other),
    }
    assert!(accumulators.is_empty());
}

#[tokio::test]
async fn test_session_staging_reaches_hooks() {
    let mut buf = BytesMut::new();
    put_str(&mut buf, &runtime_version()).unwrap();
    put_str(&mut buf, "/staged").unwrap();
    put_int(&mut buf, 1);
    put_str(&mut buf, "/staged/deps.zip").unwrap();
    put_int(&mut buf, 2);
    put_bool(&mut buf, false);
    put_long(&mut buf, 4);
    put_str(&mut buf, "/staged/broadcast_4").unwrap();
    put_long(&mut buf, 11);
    put_str(&mut buf, "/staged/broadcast_11").unwrap();
    put_request(&mut buf, &ClassReference::of_type("tests.Lines"), "lines", None, &[]);

    let mut worker = worker();
    let (outcome, _) = exchange(&mut worker, buf, special_lengths::END_OF_STREAM).await;

    assert_eq!(outcome, Outcome::Reuse);
    let files = worker.hooks().files().unwrap();
    assert_eq!(files.includes, vec![PathBuf::from("/staged/deps.zip")]);
    assert_eq!(worker.hooks().broadcasts().len(), 2);
    assert_eq!(
        worker.hooks().broadcasts()[&11],
        Some(PathBuf::from("/staged/broadcast_11"))
    );
}

#[tokio::test]
async fn test_version_mismatch_before_staging() {
    let mut buf = BytesMut::new();
    put_str(&mut buf, "0.0").unwrap();

    let mut worker = worker();
    let (outcome, view) = exchange(&mut worker, buf, special_lengths::END_OF_STREAM).await;
    assert_eq!(outcome, Outcome::Failed(ErrorKind::VersionMismatch));
    assert_eq!(expect_failure(view).error_class, "VERSION_MISMATCH");
    assert!(worker.hooks().files().is_none());
}

#[tokio::test]
async fn test_oversized_option_rejected() {
    let long_value = "v".repeat(200);
    let mut worker = Worker::builder()
        .source::<Foo>("tests.Foo")
        .max_blob_len(128)
        .build();
    let (outcome, view) = exchange(
        &mut worker,
        request("tests.Foo", "foo", None, &[("x", long_value.as_str())]),
        special_lengths::END_OF_STREAM,
    )
    .await;

    assert_eq!(outcome, Outcome::Failed(ErrorKind::Internal));
    assert!(expect_failure(view).message.contains("exceeds maximum 128"));
}

#[tokio::test]
async fn test_diagnostics_are_cleaned_up() {
    let dir = tempfile::tempdir().unwrap();
    let config = WorkerConfig {
        diagnostics_dir: Some(dir.path().to_path_buf()),
        dump_interval: Some(Duration::from_millis(5)),
        ..WorkerConfig::default()
    };
    let mut worker = Worker::builder()
        .source::<Foo>("tests.Foo")
        .config(config)
        .build();

    let (outcome, _) = exchange(
        &mut worker,
        request("tests.Foo", "foo", None, &[]),
        special_lengths::END_OF_STREAM,
    )
    .await;

    assert_eq!(outcome, Outcome::Reuse);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_diagnostics_are_cleaned_up_after_failure() {
    let cases = [
        ("tests.Strict", "strict", ErrorKind::DataSourceFailure),
        ("tests.Exploding", "exploding", ErrorKind::DataSourceFailure),
        ("tests.Foo", "bar", ErrorKind::TypeMismatch),
    ];

    for (path, provider, kind) in cases {
        let dir = tempfile::tempdir().unwrap();
        let config = WorkerConfig {
            diagnostics_dir: Some(dir.path().to_path_buf()),
            dump_interval: Some(Duration::from_millis(5)),
            ..WorkerConfig::default()
        };
        let mut worker = Worker::builder()
            .source::<Foo>("tests.Foo")
            .source::<Strict>("tests.Strict")
            .source::<Exploding>("tests.Exploding")
            .config(config)
            .build();

        let (outcome, view) = exchange(
            &mut worker,
            request(path, provider, None, &[]),
            special_lengths::END_OF_STREAM,
        )
        .await;

        assert_eq!(outcome, Outcome::Failed(kind), "request for {}", path);
        expect_failure(view);
        assert_eq!(
            std::fs::read_dir(dir.path()).unwrap().count(),
            0,
            "fault log left behind for {}",
            path
        );
    }
}

#[tokio::test]
async fn test_host_hangs_up_mid_request() {
    let mut buf = BytesMut::new();
    preamble(&mut buf);
    put_blob(
        &mut buf,
        &ClassReference::of_type("tests.Foo").encode().unwrap(),
    )
    .unwrap();

    let (worker_side, mut host_side) = duplex(64 * 1024);
    host_side.write_all(&buf).await.unwrap();
    drop(host_side);

    let mut worker = worker();
    let (read_half, write_half) = tokio::io::split(worker_side);
    let result = worker.serve(read_half, write_half).await;
    assert!(!matches!(result, Ok(Outcome::Reuse) | Ok(Outcome::Discard)));
}
