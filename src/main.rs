use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::fmt::format::FmtSpan;

use xbrl_tabulator::archive;
use xbrl_tabulator::config::Config;
use xbrl_tabulator::errors::{Error, TaxonomyError};
use xbrl_tabulator::progress::{spinner, RunBars};
use xbrl_tabulator::runner::{BatchRunner, FilingRef, FilingSource};
use xbrl_tabulator::schema::SchemaCompiler;
use xbrl_tabulator::sink::duckdb_sink::DuckDbSink;
use xbrl_tabulator::sink::sqlite::SqliteSink;
use xbrl_tabulator::sink::{MultiSink, TableSink};
use xbrl_tabulator::taxonomy::provider::{FileTaxonomyProvider, TaxonomyProvider};
use xbrl_tabulator::taxonomy::TaxonomyModel;

#[derive(Parser)]
#[command(name = "xbrl-tabulator", about = "Compiles an XBRL taxonomy into tables and projects filings into them")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compiles the taxonomy named in the config and writes its datapackage descriptor.
    CompileSchema {
        #[arg(long, default_value = "xbrl-tabulator.toml")]
        config: PathBuf,
    },
    /// Compiles the taxonomy, then extracts every filing into the configured sink(s).
    Extract {
        #[arg(long, default_value = "xbrl-tabulator.toml")]
        config: PathBuf,
        /// A single filing, a directory of filings, or a tar archive of filings.
        #[arg(long)]
        filings: PathBuf,
    },
    /// Prints the compiled table list without writing anything.
    Describe {
        #[arg(long, default_value = "xbrl-tabulator.toml")]
        config: PathBuf,
    },
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_level(true)
        .init();
}

fn load_model(config: &Config) -> Result<TaxonomyModel, Error> {
    let taxonomy_path = Path::new(&config.taxonomy);
    let provider = if archive::is_tar_archive(taxonomy_path) {
        let entry_path = config.archive_path.as_deref().ok_or_else(|| {
            Error::Taxonomy(TaxonomyError::Incomplete(
                "archive_path is required when taxonomy points at an archive".to_string(),
            ))
        })?;
        let contents = archive::read_taxonomy_entry(taxonomy_path, entry_path)?;
        FileTaxonomyProvider::from_str(&contents)?
    }
    else {
        FileTaxonomyProvider::from_path(taxonomy_path)?
    };
    let model = TaxonomyModel::compile(provider.concepts()?, provider.link_roles()?, provider.axes()?)?;
    Ok(model)
}

fn discover_filings(root: &Path) -> std::io::Result<Vec<FilingRef>> {
    let mut filings = Vec::new();

    if archive::is_tar_archive(root) {
        for (name, bytes, mtime) in archive::read_filings(root)? {
            let publication_time = chrono::DateTime::from_timestamp(mtime as i64, 0)
                .unwrap_or_else(chrono::Utc::now)
                .to_rfc3339();
            filings.push(FilingRef {
                name,
                publication_time,
                source: FilingSource::Bytes(bytes),
            });
        }
    }
    else if root.is_dir() {
        for entry in std::fs::read_dir(root)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("xml") {
                filings.push(filing_ref_for(&path)?);
            }
        }
    }
    else {
        filings.push(filing_ref_for(root)?);
    }

    filings.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(filings)
}

fn filing_ref_for(path: &Path) -> std::io::Result<FilingRef> {
    let name = path.file_stem().and_then(|s| s.to_str()).unwrap_or("filing").to_string();
    let modified = std::fs::metadata(path)?.modified()?;
    let publication_time: chrono::DateTime<chrono::Utc> = modified.into();
    Ok(FilingRef {
        name,
        publication_time: publication_time.to_rfc3339(),
        source: FilingSource::Path(path.to_path_buf()),
    })
}

fn build_sink(config: &Config) -> Result<Box<dyn TableSink>, Error> {
    let mut sinks: Vec<Box<dyn TableSink>> = Vec::new();
    if let Some(path) = &config.sqlite_path {
        sinks.push(Box::new(SqliteSink::open(path)?));
    }
    if let Some(path) = &config.duckdb_path {
        sinks.push(Box::new(DuckDbSink::open(path)?));
    }
    if sinks.is_empty() {
        return Err(Error::Sink(xbrl_tabulator::errors::SinkError::NoneConfigured));
    }
    Ok(Box::new(MultiSink::new(sinks)))
}

fn run() -> Result<i32, Error> {
    let cli = Cli::parse();

    match cli.command {
        Commands::CompileSchema { config } => {
            let config = Config::from_path(&config)?;
            let bar = spinner("compiling taxonomy");
            let model = load_model(&config)?;
            let (tables, datapackage) = SchemaCompiler::compile(&model)?;
            bar.finish_with_message(format!("compiled {} tables", tables.len()));

            if let Some(path) = &config.datapackage_path {
                let file = std::fs::File::create(path)?;
                serde_json::to_writer_pretty(file, &datapackage)?;
            }
            for table in &tables {
                tracing::info!(table = %table.name, columns = table.data_columns.len(), "compiled table");
            }
            Ok(0)
        }

        Commands::Describe { config } => {
            let config = Config::from_path(&config)?;
            let model = load_model(&config)?;
            let (tables, _) = SchemaCompiler::compile(&model)?;
            for table in &tables {
                println!("{} ({} data columns, {} primary-key columns)", table.name, table.data_columns.len(), table.primary_key.len());
            }
            Ok(0)
        }

        Commands::Extract { config, filings } => {
            let config = Config::from_path(&config)?;
            let model = load_model(&config)?;
            let (tables, datapackage) = SchemaCompiler::compile(&model)?;

            if let Some(path) = &config.datapackage_path {
                let file = std::fs::File::create(path)?;
                serde_json::to_writer_pretty(file, &datapackage)?;
            }

            let tables = match &config.tables {
                Some(allow_list) => tables.into_iter().filter(|t| allow_list.contains(&t.name)).collect(),
                None => tables,
            };

            let filing_refs = discover_filings(&filings)?;
            let concepts: HashMap<_, _> = model.concepts.clone();

            let mut sink = build_sink(&config)?;
            let bars = RunBars::new(filing_refs.len() as u64, config.effective_workers());
            let cancel = Arc::new(AtomicBool::new(false));

            let runner = BatchRunner::new(
                Arc::new(tables),
                Arc::new(concepts),
                config.effective_workers(),
                config.batch_size,
                config.filing_timeout_secs.map(Duration::from_secs),
            );

            let summary = runner.run(filing_refs, sink.as_mut(), cancel, Some(&bars))?;

            if summary.has_failures() {
                eprintln!("{}", summary.render());
                Ok(2)
            }
            else {
                Ok(0)
            }
        }
    }
}

fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            tracing::error!(error = %err, "run failed");
            std::process::exit(1);
        }
    }
}
