use std::sync::Arc;

use arrow_array::RecordBatch;
use arrow_schema::SchemaRef;
use async_trait::async_trait;
use datafusion::catalog::{CatalogProvider, SchemaProvider};
use datafusion::datasource::{MemTable, TableProvider};
use datafusion::logical_expr::{LogicalPlan, TableType as DfTableType};
use datafusion::prelude::{CsvReadOptions, ParquetReadOptions, SessionConfig, SessionContext};
use datafusion_proto::bytes::logical_plan_from_bytes;
use futures::StreamExt;
use tracing::{debug, info};

use crate::engine::errors::EngineError;
use crate::engine::query_engine::catalog::{
    Catalog, CatalogFilter, DbSchema, TableInfo, TableType,
};
use crate::engine::query_engine::{BatchStream, QueryEngine};
use crate::engine::types::Statement;
use crate::shared::config::{EngineConfig, TableFormat};
use crate::shared::response::arrow::schema_to_hex;

/// `QueryEngine` backed by an in-process DataFusion session.
pub struct DataFusionEngine {
    ctx: SessionContext,
}

impl DataFusionEngine {
    pub fn new(batch_size: usize) -> Self {
        let config = SessionConfig::new()
            .with_batch_size(batch_size.max(1))
            .with_information_schema(true);
        Self {
            ctx: SessionContext::new_with_config(config),
        }
    }

    /// Builds the engine and registers every table listed in `[[engine.tables]]`.
    pub async fn from_config(cfg: &EngineConfig) -> Result<Self, EngineError> {
        let engine = Self::new(cfg.batch_size);
        for table in &cfg.tables {
            match table.format {
                TableFormat::Csv => {
                    engine
                        .ctx
                        .register_csv(table.name.as_str(), &table.path, CsvReadOptions::new())
                        .await?
                }
                TableFormat::Parquet => {
                    engine
                        .ctx
                        .register_parquet(table.name.as_str(), &table.path, ParquetReadOptions::default())
                        .await?
                }
            }
            info!(target: "glide::engine", table = %table.name, path = %table.path, "Registered table");
        }
        Ok(engine)
    }

    /// Registers in-memory batches as a table. All batches must share `schema`.
    pub fn register_batches(
        &self,
        name: &str,
        schema: SchemaRef,
        batches: Vec<RecordBatch>,
    ) -> Result<(), EngineError> {
        let table = MemTable::try_new(schema, vec![batches])?;
        self.ctx.register_table(name, Arc::new(table))?;
        Ok(())
    }

    pub fn session(&self) -> &SessionContext {
        &self.ctx
    }

    async fn plan(&self, statement: &Statement) -> Result<LogicalPlan, EngineError> {
        let plan = match statement {
            Statement::Sql(sql) => self
                .ctx
                .state()
                .create_logical_plan(sql)
                .await
                .map_err(|e| EngineError::Planning(e.to_string()))?,
            Statement::Plan(bytes) => logical_plan_from_bytes(bytes, &self.ctx)
                .map_err(|e| EngineError::InvalidPlan(e.to_string()))?,
        };
        ensure_read_only(&plan)?;
        Ok(plan)
    }
}

/// Only queries are served; catalog changes and writes are refused before anything runs.
fn ensure_read_only(plan: &LogicalPlan) -> Result<(), EngineError> {
    match plan {
        LogicalPlan::Ddl(_) | LogicalPlan::Dml(_) | LogicalPlan::Copy(_) => Err(
            EngineError::Planning("Only read-only queries can be executed".to_string()),
        ),
        LogicalPlan::Statement(_) => Err(EngineError::Planning(
            "Session statements are not supported".to_string(),
        )),
        _ => Ok(()),
    }
}

fn table_type_name(table_type: DfTableType) -> &'static str {
    match table_type {
        DfTableType::Base => "BASE TABLE",
        DfTableType::View => "VIEW",
        DfTableType::Temporary => "LOCAL TEMPORARY",
    }
}

#[async_trait]
impl QueryEngine for DataFusionEngine {
    async fn describe(&self, statement: &Statement) -> Result<SchemaRef, EngineError> {
        let plan = self.plan(statement).await?;
        Ok(Arc::clone(plan.schema().inner()))
    }

    async fn execute(&self, statement: &Statement) -> Result<BatchStream, EngineError> {
        let plan = self.plan(statement).await?;
        debug!(target: "glide::engine", kind = %statement.kind(), "Executing plan");
        let frame = self.ctx.execute_logical_plan(plan).await?;
        let stream = frame.execute_stream().await?;
        Ok(Box::pin(stream.map(|batch| batch.map_err(EngineError::from))))
    }

    async fn catalogs(&self) -> Result<Vec<Catalog>, EngineError> {
        let mut names = self.ctx.catalog_names();
        names.sort();
        Ok(names
            .into_iter()
            .map(|catalog_name| Catalog { catalog_name })
            .collect())
    }

    async fn db_schemas(&self, filter: &CatalogFilter) -> Result<Vec<DbSchema>, EngineError> {
        let mut out = Vec::new();
        for catalog_name in self.ctx.catalog_names() {
            if !filter.matches_catalog(&catalog_name) {
                continue;
            }
            let Some(catalog) = self.ctx.catalog(&catalog_name) else {
                continue;
            };
            for db_schema_name in catalog.schema_names() {
                if filter.matches_schema(&db_schema_name) {
                    out.push(DbSchema {
                        catalog_name: catalog_name.clone(),
                        db_schema_name,
                    });
                }
            }
        }
        out.sort_by(|a, b| {
            (&a.catalog_name, &a.db_schema_name).cmp(&(&b.catalog_name, &b.db_schema_name))
        });
        Ok(out)
    }

    async fn tables(&self, filter: &CatalogFilter) -> Result<Vec<TableInfo>, EngineError> {
        let mut out = Vec::new();
        for schema in self.db_schemas(filter).await? {
            let Some(provider) = self
                .ctx
                .catalog(&schema.catalog_name)
                .and_then(|catalog| catalog.schema(&schema.db_schema_name))
            else {
                continue;
            };
            let mut table_names = provider.table_names();
            table_names.sort();
            for table_name in table_names {
                if !filter.matches_table(&table_name) {
                    continue;
                }
                let Some(table) = provider.table(&table_name).await? else {
                    continue;
                };
                out.push(TableInfo {
                    catalog_name: schema.catalog_name.clone(),
                    db_schema_name: schema.db_schema_name.clone(),
                    table_name,
                    table_type: table_type_name(table.table_type()).to_string(),
                    table_schema: schema_to_hex(&table.schema()),
                });
            }
        }
        Ok(out)
    }

    async fn table_types(&self) -> Result<Vec<TableType>, EngineError> {
        Ok([DfTableType::Base, DfTableType::View, DfTableType::Temporary]
            .into_iter()
            .map(|t| TableType {
                table_type: table_type_name(t).to_string(),
            })
            .collect())
    }
}
