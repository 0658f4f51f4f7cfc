mod query;
mod result_set;

pub use query::{ARROW_STREAM_MIME, PARQUET_MIME, PreferredFormat, Query, QueryType, Statement};
pub use result_set::{
    Endpoint, ExecutionFailure, FailureKind, ResultSet, ResultSetSummary, ResultStatus,
};
