//! Purpose: `caravel` CLI entry point and command dispatch.
//! Role: Binary crate root; parses args, runs commands, emits JSON on stdout.
//! Invariants: Command output is JSON on stdout; errors are JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
//! Invariants: All remote work goes through `api::Client` (one blocking
//!             round-trip per page or batch).
#![allow(clippy::result_large_err)]

use std::io::Read;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use serde_json::json;

use caravel::api::{
    to_exit_code, Auth, Client, ClientConfig, Column, Credentials, Endpoint, Error, ErrorKind,
    FieldMap, Filter, FilterOp, RecordId, SearchCriteria, WriteOptions, WriteRequest,
};
use caravel::core::wire::ErrorEnvelope;

mod serve;

#[derive(Parser, Debug)]
#[command(name = "caravel", version, about = "Batched record operations against governed record stores")]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct ConnectionArgs {
    /// Base URL of the hosted executor endpoint.
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Account id for credential auth.
    #[arg(long, global = true)]
    account: Option<String>,

    /// Login email for credential auth.
    #[arg(long, global = true)]
    email: Option<String>,

    /// Signature (password) for credential auth.
    #[arg(long, global = true)]
    signature: Option<String>,

    /// Role id for credential auth.
    #[arg(long, global = true)]
    role: Option<String>,

    /// Bearer token auth (dev server).
    #[arg(long, global = true)]
    token: Option<String>,

    /// Hosted script id.
    #[arg(long, global = true)]
    script: Option<String>,

    /// Hosted deploy id.
    #[arg(long, global = true)]
    deploy: Option<String>,

    /// Per-request timeout in milliseconds.
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Advisory rows per fetch invocation.
    #[arg(long, global = true)]
    batch_size: Option<usize>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch every row of a saved search.
    Fetch {
        /// Record type to fetch.
        #[arg(long = "type")]
        record_type: String,
        /// Saved search id to execute.
        #[arg(long)]
        search_id: String,
        /// Resume boundary: only ids above this are returned.
        #[arg(long, default_value_t = 0)]
        start_id: RecordId,
        /// Fetch a single invocation's batch instead of draining.
        #[arg(long)]
        one_batch: bool,
    },
    /// Search by ad-hoc criteria.
    Search {
        #[arg(long = "type")]
        record_type: String,
        /// Filter as field:operator:value (repeatable, order kept).
        #[arg(long = "filter")]
        filters: Vec<String>,
        /// Output column as field or field:join (repeatable).
        #[arg(long = "column")]
        columns: Vec<String>,
    },
    /// Load one record by id.
    Load {
        #[arg(long = "type")]
        record_type: String,
        #[arg(long)]
        id: RecordId,
    },
    /// Initialize an unsaved record of a type.
    Create {
        #[arg(long = "type")]
        record_type: String,
    },
    /// Batched upsert from a JSON array of field maps.
    Upsert {
        #[arg(long = "type")]
        record_type: String,
        /// Read requests from this file instead of stdin.
        #[arg(long)]
        file: Option<PathBuf>,
        /// Refuse to create new records.
        #[arg(long)]
        update_only: bool,
        /// Let the store source dependent field defaults.
        #[arg(long)]
        do_sourcing: bool,
        /// Skip mandatory-field validation.
        #[arg(long)]
        ignore_mandatory: bool,
    },
    /// Batched delete by id.
    Delete {
        #[arg(long = "type")]
        record_type: String,
        /// Record id (repeatable, order kept).
        #[arg(long = "id", required = true)]
        ids: Vec<RecordId>,
    },
    /// Run the loopback dev server over an in-memory store.
    Serve {
        #[arg(long, default_value = "127.0.0.1:9400")]
        bind: SocketAddr,
        /// Require this bearer token.
        #[arg(long = "serve-token")]
        serve_token: Option<String>,
        /// Allow binding outside loopback.
        #[arg(long)]
        allow_non_loopback: bool,
        /// Native page size of the simulated store.
        #[arg(long, default_value_t = caravel::api::DEFAULT_PAGE_CAP)]
        page_cap: usize,
        /// Per-invocation usage budget; omit for unmetered.
        #[arg(long)]
        budget: Option<u64>,
        /// JSON seed file of records and saved searches.
        #[arg(long)]
        seed: Option<PathBuf>,
    },
}

fn main() {
    let exit_code = match run() {
        Ok(()) => 0,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<(), Error> {
    let cli = Cli::parse();

    if let Command::Serve {
        bind,
        serve_token,
        allow_non_loopback,
        page_cap,
        budget,
        seed,
    } = cli.command
    {
        let config = serve::ServeConfig {
            bind,
            token: serve_token,
            allow_non_loopback,
            page_cap,
            budget,
            seed,
        };
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("failed to start runtime")
                    .with_source(err)
            })?;
        return runtime.block_on(serve::serve(config));
    }

    let client = build_client(&cli.connection)?;
    match cli.command {
        Command::Fetch {
            record_type,
            search_id,
            start_id,
            one_batch,
        } => {
            if one_batch {
                let page = client.fetch_page(&record_type, &search_id, start_id)?;
                emit_json(&json!({
                    "rows": page.rows,
                    "cursor": page.cursor,
                    "quota_exhausted": page.quota_exhausted,
                }))
            } else {
                let rows = client.fetch_all_from(&record_type, &search_id, start_id)?;
                emit_json(&json!({ "rows": rows }))
            }
        }
        Command::Search {
            record_type,
            filters,
            columns,
        } => {
            let criteria = parse_criteria(&filters, &columns)?;
            let rows = client.search(&record_type, &criteria)?;
            emit_json(&json!({ "rows": rows }))
        }
        Command::Load { record_type, id } => {
            let record = client.load_record(&record_type, id)?;
            emit_json(&json!({ "record": record }))
        }
        Command::Create { record_type } => {
            let record = client.create_record(&record_type)?;
            emit_json(&json!({ "record": record }))
        }
        Command::Upsert {
            record_type,
            file,
            update_only,
            do_sourcing,
            ignore_mandatory,
        } => {
            let requests = read_write_requests(file.as_deref())?;
            let options = WriteOptions {
                update_only,
                do_sourcing,
                ignore_mandatory,
            };
            let results = client.upsert(&record_type, requests, options)?;
            emit_json(&json!({ "results": results }))
        }
        Command::Delete { record_type, ids } => {
            let results = client.delete_records(&record_type, &ids)?;
            emit_json(&json!({ "results": results }))
        }
        Command::Serve { .. } => unreachable!("handled above"),
    }
}

fn build_client(connection: &ConnectionArgs) -> Result<Client, Error> {
    let base_url = connection.base_url.as_deref().ok_or_else(|| {
        Error::new(ErrorKind::Usage)
            .with_message("this command needs --base-url")
            .with_hint("Point it at a hosted executor or a local `caravel serve`.")
    })?;
    let mut endpoint = Endpoint::new(base_url)?;
    if let Some(script) = &connection.script {
        endpoint = endpoint.with_script(script);
    }
    if let Some(deploy) = &connection.deploy {
        endpoint = endpoint.with_deploy(deploy);
    }

    let auth = build_auth(connection)?;
    let mut config = ClientConfig::new();
    if let Some(timeout_ms) = connection.timeout_ms {
        config = config.with_timeout(Duration::from_millis(timeout_ms));
    }
    if let Some(batch_size) = connection.batch_size {
        config = config.with_search_batch_size(batch_size);
    }
    Ok(Client::connect(endpoint, auth).with_config(config))
}

fn build_auth(connection: &ConnectionArgs) -> Result<Auth, Error> {
    let credential_parts = [
        &connection.account,
        &connection.email,
        &connection.signature,
        &connection.role,
    ];
    let given = credential_parts.iter().filter(|part| part.is_some()).count();
    if given > 0 && given < credential_parts.len() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("credential auth needs --account, --email, --signature, and --role")
            .with_hint("Provide all four, or use --token instead."));
    }
    if given == credential_parts.len() {
        if connection.token.is_some() {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("--token cannot be combined with credential auth"));
        }
        return Ok(Auth::Credentials(Credentials::new(
            connection.account.clone().unwrap_or_default(),
            connection.email.clone().unwrap_or_default(),
            connection.signature.clone().unwrap_or_default(),
            connection.role.clone().unwrap_or_default(),
        )));
    }
    if let Some(token) = &connection.token {
        return Ok(Auth::Token(token.clone()));
    }
    Ok(Auth::Anonymous)
}

fn parse_criteria(filters: &[String], columns: &[String]) -> Result<SearchCriteria, Error> {
    let mut criteria = SearchCriteria::new();
    for raw in filters {
        criteria = criteria.filter(parse_filter(raw)?);
    }
    for raw in columns {
        criteria = criteria.column(parse_column(raw));
    }
    Ok(criteria)
}

fn parse_filter(raw: &str) -> Result<Filter, Error> {
    let mut parts = raw.splitn(3, ':');
    let (Some(field), Some(operator), Some(value)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(Error::new(ErrorKind::Usage)
            .with_message(format!("invalid filter [{raw}]"))
            .with_hint("Use field:operator:value, e.g. status:is:active."));
    };
    let operator = parse_operator(operator)?;
    let value = match value.parse::<u64>() {
        Ok(number) => json!(number),
        Err(_) => json!(value),
    };
    Ok(Filter {
        field: field.to_string(),
        operator,
        value,
    })
}

fn parse_operator(raw: &str) -> Result<FilterOp, Error> {
    match raw {
        "is" => Ok(FilterOp::Is),
        "isnot" => Ok(FilterOp::IsNot),
        "greaterthan" => Ok(FilterOp::GreaterThan),
        "lessthan" => Ok(FilterOp::LessThan),
        "contains" => Ok(FilterOp::Contains),
        "startswith" => Ok(FilterOp::StartsWith),
        other => Err(Error::new(ErrorKind::Usage)
            .with_message(format!("unknown filter operator [{other}]"))
            .with_hint("Use is, isnot, greaterthan, lessthan, contains, or startswith.")),
    }
}

fn parse_column(raw: &str) -> Column {
    match raw.split_once(':') {
        Some((field, join)) => Column::joined(field, join),
        None => Column::new(raw),
    }
}

fn read_write_requests(file: Option<&std::path::Path>) -> Result<Vec<WriteRequest>, Error> {
    let raw = match file {
        Some(path) => std::fs::read_to_string(path).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to read request file")
                .with_source(err)
        })?,
        None => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer).map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("failed to read stdin")
                    .with_source(err)
            })?;
            buffer
        }
    };
    let maps: Vec<FieldMap> = serde_json::from_str(&raw).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("requests must be a JSON array of field maps")
            .with_source(err)
    })?;
    Ok(maps.into_iter().map(WriteRequest::from_fields).collect())
}

fn emit_json(payload: &serde_json::Value) -> Result<(), Error> {
    let rendered = serde_json::to_string_pretty(payload).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to encode output json")
            .with_source(err)
    })?;
    println!("{rendered}");
    Ok(())
}

fn emit_error(err: &Error) {
    let envelope = ErrorEnvelope::from_error(err);
    match serde_json::to_string(&envelope) {
        Ok(rendered) => eprintln!("{rendered}"),
        Err(_) => eprintln!("{err}"),
    }
}
