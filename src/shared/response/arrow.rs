use std::pin::Pin;

use arrow_array::RecordBatch;
use arrow_ipc::writer::{DictionaryTracker, IpcDataGenerator, IpcWriteOptions};
use arrow_schema::{ArrowError, Schema, SchemaRef};
use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};

use crate::engine::errors::EncodeError;
use crate::engine::query_engine::BatchStream;

type EncodeResult<T> = Result<T, EncodeError>;

/// Arrow IPC stream frames, one complete protocol frame per item.
pub type FrameStream = Pin<Box<dyn Stream<Item = EncodeResult<Bytes>> + Send>>;

const CONTINUATION_MARKER: u32 = 0xFFFF_FFFF;

pub struct ArrowStreamEncoder {
    schema: SchemaRef,
    data_gen: IpcDataGenerator,
    dictionary_tracker: DictionaryTracker,
    write_options: IpcWriteOptions,
}

impl ArrowStreamEncoder {
    pub fn new(schema: SchemaRef) -> Self {
        Self {
            schema,
            data_gen: IpcDataGenerator::default(),
            dictionary_tracker: DictionaryTracker::new(true),
            write_options: IpcWriteOptions::default(),
        }
    }

    pub fn write_schema(&mut self, out: &mut Vec<u8>) -> EncodeResult<()> {
        out.clear();
        let encoded = self.data_gen.schema_to_bytes_with_dictionary_tracker(
            &self.schema,
            &mut self.dictionary_tracker,
            &self.write_options,
        );

        arrow_ipc::writer::write_message(&mut *out, encoded, &self.write_options)?;
        Ok(())
    }

    /// Encodes one batch frame: its dictionaries followed by the record batch message.
    /// `out` is only filled once the whole frame has been encoded.
    pub fn write_batch(&mut self, batch: &RecordBatch, out: &mut Vec<u8>) -> EncodeResult<()> {
        out.clear();
        check_batch_schema(&self.schema, batch)?;

        let (dict_batches, record_data) =
            self.data_gen
                .encoded_batch(batch, &mut self.dictionary_tracker, &self.write_options)?;

        let mut frame = Vec::new();
        for encoded in dict_batches {
            arrow_ipc::writer::write_message(&mut frame, encoded, &self.write_options)?;
        }
        arrow_ipc::writer::write_message(&mut frame, record_data, &self.write_options)?;
        out.extend_from_slice(&frame);
        Ok(())
    }

    pub fn write_end(&mut self, out: &mut Vec<u8>) -> EncodeResult<()> {
        out.clear();
        out.extend_from_slice(&CONTINUATION_MARKER.to_le_bytes());
        out.extend_from_slice(&0i32.to_le_bytes());
        Ok(())
    }
}

/// Column count and data types must line up; field names and nullability may differ
/// between a described schema and what the engine produces.
fn check_batch_schema(schema: &Schema, batch: &RecordBatch) -> EncodeResult<()> {
    let batch_schema = batch.schema();
    if batch_schema.fields().len() != schema.fields().len() {
        return Err(EncodeError::SchemaMismatch(format!(
            "expected {} columns, batch has {}",
            schema.fields().len(),
            batch_schema.fields().len()
        )));
    }
    for (expected, actual) in schema.fields().iter().zip(batch_schema.fields().iter()) {
        if expected.data_type() != actual.data_type() {
            return Err(EncodeError::SchemaMismatch(format!(
                "column '{}' is {} but batch column '{}' is {}",
                expected.name(),
                expected.data_type(),
                actual.name(),
                actual.data_type()
            )));
        }
    }
    Ok(())
}

enum Phase {
    Header,
    Batches,
    Done,
}

struct FrameState {
    encoder: ArrowStreamEncoder,
    batches: BatchStream,
    phase: Phase,
}

impl FrameState {
    async fn next_frame(&mut self) -> Option<EncodeResult<Bytes>> {
        let mut out = Vec::new();
        match self.phase {
            Phase::Header => {
                self.phase = Phase::Batches;
                let result = self.encoder.write_schema(&mut out);
                Some(self.finish(result, out))
            }
            Phase::Batches => loop {
                match self.batches.next().await {
                    Some(Ok(batch)) => {
                        if batch.num_rows() == 0 {
                            continue;
                        }
                        let result = self.encoder.write_batch(&batch, &mut out);
                        return Some(self.finish(result, out));
                    }
                    Some(Err(err)) => {
                        self.phase = Phase::Done;
                        return Some(Err(EncodeError::Source(err)));
                    }
                    None => {
                        self.phase = Phase::Done;
                        let result = self.encoder.write_end(&mut out);
                        return Some(result.map(|_| Bytes::from(out)));
                    }
                }
            },
            Phase::Done => None,
        }
    }

    fn finish(&mut self, result: EncodeResult<()>, out: Vec<u8>) -> EncodeResult<Bytes> {
        match result {
            Ok(()) => Ok(Bytes::from(out)),
            Err(err) => {
                self.phase = Phase::Done;
                Err(err)
            }
        }
    }
}

/// Lazily encodes `batches` as an Arrow IPC stream.
///
/// Nothing is pulled from `batches` until the consumer asks for the next frame, so a slow
/// reader throttles execution and dropping the stream drops the engine cursor with it.
/// After an error the stream ends without writing the end-of-stream marker.
pub fn encode_stream(schema: SchemaRef, batches: BatchStream) -> FrameStream {
    let state = FrameState {
        encoder: ArrowStreamEncoder::new(schema),
        batches,
        phase: Phase::Header,
    };
    Box::pin(stream::unfold(state, |mut state| async move {
        let frame = state.next_frame().await?;
        Some((frame, state))
    }))
}

/// Hex of the encapsulated IPC schema message, the form schemas take inside JSON.
pub fn schema_to_hex(schema: &Schema) -> String {
    hex::encode(schema_to_bytes(schema))
}

pub fn schema_to_bytes(schema: &Schema) -> Vec<u8> {
    let data_gen = IpcDataGenerator::default();
    let mut tracker = DictionaryTracker::new(true);
    let options = IpcWriteOptions::default();
    let encoded = data_gen.schema_to_bytes_with_dictionary_tracker(schema, &mut tracker, &options);
    let mut out = Vec::new();
    if arrow_ipc::writer::write_message(&mut out, encoded, &options).is_err() {
        out.clear();
    }
    out
}

pub fn schema_from_hex(encoded: &str) -> Result<Schema, ArrowError> {
    let bytes = hex::decode(encoded.trim())
        .map_err(|e| ArrowError::ParseError(format!("Schema is not valid hex: {e}")))?;
    arrow_ipc::convert::try_schema_from_ipc_buffer(&bytes)
}
