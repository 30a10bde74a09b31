use annotator_core::Annotation;
use annotator_storage::{Gateway, GatewayConfig, UreqTransport};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "annotator-cli")]
#[command(about = "Review annotation CLI")]
pub struct Cli {
    /// Gateway config file (JSON); defaults to the platform config dir.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Download a file's annotations as JSON.
    Pull {
        #[arg(long)]
        file_id: u64,
        #[arg(long)]
        user_id: u64,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Replace a file's stored annotations with the ones in a JSON file.
    Push {
        #[arg(long)]
        file_id: u64,
        #[arg(long)]
        user_id: u64,
        #[arg(value_name = "ANNOTATIONS")]
        annotations: PathBuf,
        /// Ask the server to echo the persisted set.
        #[arg(long)]
        return_full: bool,
    },
    /// Burn annotations into a PDF locally.
    Flatten {
        #[arg(value_name = "PDF")]
        input: PathBuf,
        #[arg(long, value_name = "ANNOTATIONS")]
        annotations: PathBuf,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Flatten annotations into a PDF and upload the result.
    Export {
        #[arg(long)]
        file_id: u64,
        #[arg(long)]
        user_id: u64,
        #[arg(value_name = "PDF")]
        input: PathBuf,
        /// Local annotations; fetched from the server when omitted.
        #[arg(long, value_name = "ANNOTATIONS")]
        annotations: Option<PathBuf>,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Serialize)]
struct PullOutput {
    annotations: usize,
    output: String,
}

#[derive(Debug, Serialize)]
struct PushOutput {
    saved: usize,
    updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    persisted: Option<usize>,
}

#[derive(Debug, Serialize)]
struct FlattenOutput {
    annotations: usize,
    output: String,
    pages: u32,
}

#[derive(Debug, Serialize)]
struct ExportOutput {
    annotations: usize,
    object_key: String,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    init_logging();

    match cli.command {
        Commands::Pull { file_id, user_id, output } => {
            run_pull(cli.config.as_deref(), file_id, user_id, output.as_deref())
        }
        Commands::Push { file_id, user_id, annotations, return_full } => {
            run_push(cli.config.as_deref(), file_id, user_id, &annotations, return_full)
        }
        Commands::Flatten { input, annotations, output } => {
            run_flatten(&input, &annotations, output.as_deref())
        }
        Commands::Export { file_id, user_id, input, annotations } => {
            run_export(cli.config.as_deref(), file_id, user_id, &input, annotations.as_deref())
        }
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Log to stderr, filtered by `RUST_LOG` (default `warn`)
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn gateway_config(config: Option<&Path>) -> Result<GatewayConfig> {
    let config = GatewayConfig::resolve(config)
        .context("failed to load gateway config")?
        .with_env(|key| std::env::var(key).ok());
    tracing::debug!(base_url = %config.base_url, "using gateway");
    Ok(config)
}

fn gateway(config: Option<&Path>) -> Result<Gateway<UreqTransport>> {
    Ok(Gateway::http(gateway_config(config)?))
}

fn run_pull(config: Option<&Path>, file_id: u64, user_id: u64, output: Option<&Path>) -> Result<()> {
    let gateway = gateway(config)?;
    let annotations: Vec<Annotation> = gateway
        .load(file_id, user_id)
        .with_context(|| format!("failed to load annotations for file {file_id}"))?
        .into_values()
        .flatten()
        .collect();

    let json = serde_json::to_string_pretty(&annotations)?;
    match output {
        Some(path) => {
            write_file(path, json.as_bytes())?;
            let summary =
                PullOutput { annotations: annotations.len(), output: path.display().to_string() };
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn run_push(
    config: Option<&Path>,
    file_id: u64,
    user_id: u64,
    annotations: &Path,
    return_full: bool,
) -> Result<()> {
    let annotations = read_annotations(annotations)?;
    let config = gateway_config(config)?;
    let gateway = Gateway::http(config.with_return_full(return_full));

    let receipt = gateway
        .save(file_id, user_id, &annotations)
        .with_context(|| format!("failed to save annotations for file {file_id}"))?;

    let payload = PushOutput {
        saved: receipt.saved,
        updated_at: receipt.updated_at,
        persisted: receipt.persisted.map(|pages| pages.values().map(Vec::len).sum()),
    };
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

fn run_flatten(input: &Path, annotations: &Path, output: Option<&Path>) -> Result<()> {
    ensure_file_exists(input)?;
    let pdf = fs::read(input).with_context(|| format!("failed to read {}", input.display()))?;
    let annotations = read_annotations(annotations)?;

    let flattened =
        annotator_flatten::flatten_annotations(&pdf, &annotations).context("failed to flatten PDF")?;
    let pages = annotator_flatten::page_count(&flattened)?;

    let output = output.map(ToOwned::to_owned).unwrap_or_else(|| default_flatten_output(input));
    write_file(&output, &flattened)?;

    let payload = FlattenOutput {
        annotations: annotations.len(),
        output: output.display().to_string(),
        pages,
    };
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

fn run_export(
    config: Option<&Path>,
    file_id: u64,
    user_id: u64,
    input: &Path,
    annotations: Option<&Path>,
) -> Result<()> {
    ensure_file_exists(input)?;
    let pdf = fs::read(input).with_context(|| format!("failed to read {}", input.display()))?;
    let gateway = gateway(config)?;

    let annotations = match annotations {
        Some(path) => read_annotations(path)?,
        None => gateway
            .load(file_id, user_id)
            .with_context(|| format!("failed to load annotations for file {file_id}"))?
            .into_values()
            .flatten()
            .collect(),
    };

    let object_key = gateway
        .export(file_id, user_id, &pdf, &annotations)
        .context("failed to export PDF")?;

    let payload = ExportOutput { annotations: annotations.len(), object_key };
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

fn read_annotations(path: &Path) -> Result<Vec<Annotation>> {
    ensure_file_exists(path)?;
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_slice(&bytes)
        .with_context(|| format!("invalid annotations file {}", path.display()))
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))
}

fn ensure_file_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("path is not a file: {}", path.display());
    }

    Ok(())
}

fn default_flatten_output(file: &Path) -> PathBuf {
    let stem = file.file_stem().and_then(|name| name.to_str()).unwrap_or("document");

    file.with_file_name(format!("{stem}-annotated.pdf"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_output_sits_next_to_input() {
        assert_eq!(
            default_flatten_output(Path::new("/tmp/review/plan.pdf")),
            PathBuf::from("/tmp/review/plan-annotated.pdf")
        );
    }

    #[test]
    fn commands_parse() {
        let cli = Cli::try_parse_from([
            "annotator-cli",
            "--config",
            "gateway.json",
            "push",
            "--file-id",
            "42",
            "--user-id",
            "7",
            "notes.json",
            "--return-full",
        ])
        .unwrap();
        assert_eq!(cli.config.as_deref(), Some(Path::new("gateway.json")));
        assert!(matches!(
            cli.command,
            Commands::Push { file_id: 42, user_id: 7, return_full: true, .. }
        ));

        assert!(Cli::try_parse_from(["annotator-cli", "pull", "--file-id", "x"]).is_err());
    }
}
