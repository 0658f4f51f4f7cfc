mod bulk_exporter;
mod signer;
mod store;

pub use bulk_exporter::{BulkExporter, write_parquet};
pub use signer::{SignedUrl, UrlSigner};
pub use store::{ObjectStoreResultStore, ResultStore};
