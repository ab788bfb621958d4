/*!
GraphSnap CLI - Command-line interface for encoded object graphs.

This CLI inspects, verifies and re-formats envelope text produced by the
serializer, and reads the metadata of graph archives. It needs none of the
application's factories: everything except `verify --decode` works on the
structure of the text alone.
*/

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use graphsnap_core::archive::unpack;
use graphsnap_core::node::reformat;
use graphsnap_core::{
    init_observability, ArchiveMetadata, EnvelopeReport, GraphSerializer, GraphSnapError,
    SerializerConfig,
};
use tabled::{Table, Tabled};
use tracing::{error, info};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Parser)]
#[command(name = "graphsnap")]
#[command(about = "CLI for inspecting graphsnap envelopes and archives")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Refuse input nested deeper than this
    #[arg(long, global = true, env = "GRAPHSNAP_MAX_DEPTH", default_value_t = graphsnap_core::config::DEFAULT_MAX_DEPTH)]
    max_depth: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize the nodes of an envelope or archive
    Inspect {
        /// Envelope text or archive file
        file: PathBuf,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check archive integrity and envelope consistency
    Verify {
        /// Envelope text or archive file
        file: PathBuf,
        /// Also rebuild the graph with the built-in factories
        #[arg(long)]
        decode: bool,
    },
    /// Re-indent an envelope
    Pretty {
        /// Envelope text or archive file
        file: PathBuf,
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show the metadata of an archive
    ArchiveInfo {
        /// Archive file
        file: PathBuf,
    },
}

#[derive(Tabled)]
struct ClassInfo {
    #[tabled(rename = "Class")]
    class: String,
    #[tabled(rename = "Nodes")]
    nodes: usize,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.log_json)?;

    match cli.command {
        Commands::Inspect { file, json } => inspect_graph(&file, json, cli.max_depth)?,
        Commands::Verify { file, decode } => verify_graph(&file, decode, cli.max_depth).await?,
        Commands::Pretty { file, output } => pretty_graph(&file, output.as_deref(), cli.max_depth)?,
        Commands::ArchiveInfo { file } => show_archive(&file)?,
    }

    Ok(())
}

fn init_logging(verbose: bool, json: bool) -> Result<(), anyhow::Error> {
    if verbose {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("graphsnap=debug"));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        init_observability(json)?;
    }
    Ok(())
}

/// Read a file as either an archive or bare envelope text
fn load_graph(path: &Path) -> Result<(Option<ArchiveMetadata>, String), anyhow::Error> {
    let bytes = std::fs::read(path)?;

    match unpack(&bytes) {
        Ok((metadata, graph)) => Ok((Some(metadata), graph)),
        Err(GraphSnapError::Json(_)) if !bytes.starts_with(&GZIP_MAGIC) => {
            Ok((None, String::from_utf8(bytes)?))
        }
        Err(e) => Err(e.into()),
    }
}

fn inspect_graph(path: &Path, json: bool, max_depth: usize) -> Result<(), anyhow::Error> {
    info!("Inspecting {}", path.display());

    let (metadata, graph) = load_graph(path)?;
    let report = EnvelopeReport::analyze_with_limit(&graph, max_depth)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if let Some(metadata) = &metadata {
        println!("Archive: {} ({})", metadata.label, metadata.archive_id);
    }
    println!("Envelope version: {}", report.version);
    println!("Nodes: {}", report.node_count);
    println!("Ref markers: {}", report.ref_markers);
    println!("Self markers: {}", report.self_markers);
    println!("Inline values: {}", report.inline_values);
    println!("Max depth: {}", report.max_depth);

    if !report.classes.is_empty() {
        let rows: Vec<ClassInfo> = report
            .classes
            .iter()
            .map(|(class, nodes)| ClassInfo {
                class: class.clone(),
                nodes: *nodes,
            })
            .collect();
        println!("{}", Table::new(rows));
    }

    if !report.is_consistent() {
        println!("Warning: envelope is inconsistent, run `graphsnap verify` for details");
    }

    Ok(())
}

async fn verify_graph(path: &Path, decode: bool, max_depth: usize) -> Result<(), anyhow::Error> {
    info!("Verifying {}", path.display());

    let (metadata, graph) = match load_graph(path) {
        Ok(loaded) => loaded,
        Err(e) => {
            if let Some(GraphSnapError::IntegrityCheckFailed { expected, actual }) =
                e.downcast_ref::<GraphSnapError>()
            {
                error!("✗ Integrity check failed:");
                error!("  Expected hash: {}", expected);
                error!("  Actual hash: {}", actual);
                return Err(anyhow::anyhow!("Integrity check failed"));
            }
            return Err(e);
        }
    };
    if metadata.is_some() {
        println!("✓ Archive integrity check passed");
    }

    let report = EnvelopeReport::analyze_with_limit(&graph, max_depth)?;
    if !report.is_consistent() {
        for ref_id in &report.dangling_refs {
            error!("  Dangling ref: {}", ref_id);
        }
        for ref_id in &report.duplicate_refs {
            error!("  Duplicate ref: {}", ref_id);
        }
        for problem in &report.problems {
            error!("  Malformed node: {}", problem);
        }
        return Err(anyhow::anyhow!("Envelope is inconsistent"));
    }
    println!("✓ Envelope is consistent ({} nodes)", report.node_count);

    if decode {
        let config = SerializerConfig {
            max_depth,
            ..SerializerConfig::default()
        };
        let serializer = GraphSerializer::from_config(config)?;
        serializer.deserialize(&graph, &[]).await?;
        println!("✓ Graph rebuilt with the built-in factories");
        info!("{}", graphsnap_core::observability::gather_metrics()?);
    }

    Ok(())
}

fn pretty_graph(path: &Path, output: Option<&Path>, max_depth: usize) -> Result<(), anyhow::Error> {
    let (_, graph) = load_graph(path)?;
    let pretty = reformat(&graph, max_depth, true)?;

    match output {
        Some(target) => {
            std::fs::write(target, pretty)?;
            println!("Wrote {}", target.display());
        }
        None => println!("{pretty}"),
    }
    Ok(())
}

fn show_archive(path: &Path) -> Result<(), anyhow::Error> {
    let (metadata, _) = load_graph(path)?;
    let metadata =
        metadata.ok_or_else(|| anyhow::anyhow!("{} is not a graph archive", path.display()))?;
    let stored = std::fs::metadata(path)?.len();

    println!("Archive Details:");
    println!("  ID: {}", metadata.archive_id);
    println!("  Label: {}", metadata.label);
    println!("  Created: {}", format_timestamp(&metadata));
    println!("  Format Version: {}", metadata.format_version);
    println!("  Envelope Version: {}", metadata.envelope_version);
    println!("  Nodes: {}", metadata.node_count);
    println!("  Compression: {}", metadata.compression_algorithm);
    println!("  Size: {} ({} stored)", format_size(metadata.uncompressed_size as u64), format_size(stored));
    println!("  Content Hash: {}", metadata.content_hash);

    if let Some(description) = &metadata.description {
        println!("  Description: {description}");
    }
    Ok(())
}

fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

fn format_timestamp(metadata: &ArchiveMetadata) -> String {
    metadata
        .timestamp
        .with_timezone(&chrono::Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}
