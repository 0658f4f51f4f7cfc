use std::io::Cursor;
use std::sync::Arc;

use arrow_array::{Int32Array, RecordBatch, StringArray};
use arrow_ipc::reader::StreamReader;
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use futures::{StreamExt, stream};

use crate::engine::errors::{EncodeError, EngineError};
use crate::engine::query_engine::{BatchStream, batches_stream};
use crate::shared::response::arrow::{
    ArrowStreamEncoder, encode_stream, schema_from_hex, schema_to_hex,
};

fn schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("n", DataType::Int32, false),
        Field::new("label", DataType::Utf8, true),
    ]))
}

fn batch(values: Vec<i32>) -> RecordBatch {
    let labels: Vec<String> = values.iter().map(|v| format!("row-{v}")).collect();
    RecordBatch::try_new(
        schema(),
        vec![
            Arc::new(Int32Array::from(values)),
            Arc::new(StringArray::from(labels)),
        ],
    )
    .expect("batch")
}

async fn collect(frames: crate::shared::response::FrameStream) -> (Vec<u8>, Vec<EncodeError>) {
    let mut bytes = Vec::new();
    let mut errors = Vec::new();
    let mut frames = frames;
    while let Some(frame) = frames.next().await {
        match frame {
            Ok(b) => bytes.extend_from_slice(&b),
            Err(e) => errors.push(e),
        }
    }
    (bytes, errors)
}

#[tokio::test]
async fn encoded_stream_is_readable_by_arrow_reader() {
    let frames = encode_stream(
        schema(),
        batches_stream(vec![batch(vec![1, 2]), batch(vec![]), batch(vec![3])]),
    );
    let (bytes, errors) = collect(frames).await;
    assert!(errors.is_empty());

    let reader = StreamReader::try_new(Cursor::new(bytes), None).expect("reader");
    assert_eq!(reader.schema(), schema());
    let batches: Vec<RecordBatch> = reader.collect::<Result<_, _>>().expect("batches");
    // Empty batches never reach the wire.
    assert_eq!(batches.len(), 2);
    let rows: usize = batches.iter().map(|b| b.num_rows()).sum();
    assert_eq!(rows, 3);
}

#[tokio::test]
async fn empty_result_still_carries_schema_and_end_marker() {
    let (bytes, errors) = collect(encode_stream(schema(), batches_stream(vec![]))).await;
    assert!(errors.is_empty());
    assert_eq!(&bytes[bytes.len() - 8..], &[0xFF, 0xFF, 0xFF, 0xFF, 0, 0, 0, 0]);

    let reader = StreamReader::try_new(Cursor::new(bytes), None).expect("reader");
    assert_eq!(reader.count(), 0);
}

#[tokio::test]
async fn source_error_ends_stream_without_end_marker() {
    let failing: BatchStream = Box::pin(stream::iter(vec![
        Ok(batch(vec![1])),
        Err(EngineError::Execution("disk on fire".into())),
        Ok(batch(vec![2])),
    ]));
    let mut frames = encode_stream(schema(), failing);

    assert!(frames.next().await.expect("schema frame").is_ok());
    assert!(frames.next().await.expect("batch frame").is_ok());
    assert!(matches!(
        frames.next().await,
        Some(Err(EncodeError::Source(EngineError::Execution(_))))
    ));
    assert!(frames.next().await.is_none());
}

#[test]
fn batch_with_other_types_is_rejected() {
    let mut encoder = ArrowStreamEncoder::new(schema());
    let other = RecordBatch::try_new(
        Arc::new(Schema::new(vec![Field::new("x", DataType::Utf8, false)])),
        vec![Arc::new(StringArray::from(vec!["a"]))],
    )
    .expect("batch");
    let mut out = Vec::new();
    let err = encoder.write_batch(&other, &mut out).expect_err("mismatch");
    assert!(matches!(err, EncodeError::SchemaMismatch(_)));
    assert!(out.is_empty());
}

#[test]
fn schema_hex_round_trips() {
    let encoded = schema_to_hex(&schema());
    let decoded = schema_from_hex(&encoded).expect("decode");
    assert_eq!(decoded, *schema());
    assert!(schema_from_hex("zz").is_err());
}
