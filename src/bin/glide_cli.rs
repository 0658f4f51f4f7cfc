use std::env;
use std::time::Instant;

use clap::{Parser, Subcommand};
use datafusion::arrow::util::pretty::pretty_format_batches;

use glide::client::{GlideClient, QueryResult, Submission};
use glide::engine::types::PreferredFormat;
use glide::frontend::http::json_query::QueryRequest;

#[derive(Parser)]
#[command(name = "glide-cli")]
#[command(about = "Submit queries to a Glide server and fetch their results", long_about = None)]
struct Args {
    /// Glide HTTP server URL
    /// Can also be set via GLIDE_URL environment variable
    #[arg(short, long)]
    url: Option<String>,

    /// Bearer token
    /// Can also be set via GLIDE_TOKEN environment variable
    #[arg(short, long)]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a query and print its rows
    Query {
        /// SQL text (or a prepared statement handle with --prepared)
        sql: Option<String>,

        /// Hex-encoded serialized logical plan instead of SQL
        #[arg(long, conflicts_with = "sql")]
        plan: Option<String>,

        /// Treat the positional argument as a prepared statement handle
        #[arg(long, requires = "sql")]
        prepared: bool,

        /// Stream the result inline instead of polling
        #[arg(long)]
        direct: bool,

        /// Ask for the result as a bulk Parquet file
        #[arg(long)]
        bulk: bool,

        /// Submit and print the result set summary without waiting
        #[arg(long, conflicts_with = "direct")]
        no_wait: bool,

        /// Maximum number of rows to display (0 = unlimited)
        #[arg(short, long, default_value = "0")]
        limit: usize,
    },
    /// Register a prepared statement and print its handle
    Prepare { sql: String },
    /// Show the current state of a result set
    Status { handle: String },
    /// Cancel a running result set
    Cancel { handle: String },
    /// List tables, optionally filtered by name pattern
    Tables { pattern: Option<String> },
    /// List catalogs
    Catalogs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let url = args
        .url
        .or_else(|| env::var("GLIDE_URL").ok())
        .unwrap_or_else(|| "http://127.0.0.1:8000".to_string());
    let token = args
        .token
        .or_else(|| env::var("GLIDE_TOKEN").ok())
        .unwrap_or_default();
    let client = GlideClient::new(url).with_token(token);

    match args.command {
        Command::Query {
            sql,
            plan,
            prepared,
            direct,
            bulk,
            no_wait,
            limit,
        } => {
            let request = match (sql, plan) {
                (Some(handle), None) if prepared => QueryRequest::prepared(handle),
                (Some(sql), None) => QueryRequest::sql(sql),
                (None, Some(plan)) => QueryRequest::plan(plan),
                _ => anyhow::bail!("Provide either SQL text or --plan"),
            };
            let format = if bulk {
                PreferredFormat::BulkFile
            } else {
                PreferredFormat::Stream
            };
            let request = request.direct(direct).format(format);

            let started = Instant::now();
            if no_wait {
                if let Submission::Deferred(summary) = client.submit(&request).await? {
                    println!("{}", serde_json::to_string_pretty(&summary)?);
                }
                return Ok(());
            }
            let result = client.query(&request).await?;
            print_result(&result, limit)?;
            eprintln!("Elapsed: {:.3} ms", started.elapsed().as_secs_f64() * 1000.0);
        }
        Command::Prepare { sql } => {
            let prepared = client.prepare(&QueryRequest::sql(sql)).await?;
            println!("{}", prepared.handle);
        }
        Command::Status { handle } => {
            let summary = client.result_set(&handle).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Cancel { handle } => {
            let summary = client.cancel(&handle).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Tables { pattern } => {
            for table in client.tables(pattern.as_deref()).await? {
                println!(
                    "{}.{}.{}\t{}",
                    table.catalog_name, table.db_schema_name, table.table_name, table.table_type
                );
            }
        }
        Command::Catalogs => {
            for catalog in client.catalogs().await? {
                println!("{}", catalog.catalog_name);
            }
        }
    }
    Ok(())
}

fn print_result(result: &QueryResult, row_limit: usize) -> anyhow::Result<()> {
    if let Some(handle) = &result.handle {
        eprintln!("Handle: {handle}");
    }
    let total = result.num_rows();
    if total == 0 {
        println!("Schema:");
        for (i, field) in result.schema.fields().iter().enumerate() {
            println!("  {}: {} ({})", i, field.name(), field.data_type());
        }
        println!("No data rows found.");
        return Ok(());
    }

    let mut shown = Vec::new();
    let mut remaining = if row_limit > 0 { row_limit } else { total };
    for batch in &result.batches {
        if remaining == 0 {
            break;
        }
        let take = remaining.min(batch.num_rows());
        shown.push(batch.slice(0, take));
        remaining -= take;
    }
    println!("{}", pretty_format_batches(&shown)?);
    println!(
        "Total rows: {} (showing {})",
        total,
        shown.iter().map(|b| b.num_rows()).sum::<usize>()
    );
    Ok(())
}
