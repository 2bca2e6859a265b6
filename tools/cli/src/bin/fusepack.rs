use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use fusepack::assets::content_hash;
use fusepack::{
    build_project, compile_in_memory, decompile_archive, read_archive, BuildOptions,
    DecompileOptions, FuseError, FuseFrontend, LoadedProject, ProjectDescription, Warning,
    DEFAULT_AGENT,
};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(author, version, about = "Stage/sprite project packager")]
struct Cli {
    /// Raise log verbosity (-v debug, -vv trace). `RUST_LOG` takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build a project description into an archive.
    Build {
        project: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long, default_value = DEFAULT_AGENT)]
        agent: String,
    },
    /// Reconstruct sources, assets and a project description from an archive.
    Decompile {
        archive: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Type files describing modules the archive calls into.
        #[arg(long = "type-file")]
        type_files: Vec<PathBuf>,
    },
    /// Check a project description and compile it without writing anything.
    Validate { project: PathBuf },
    /// Print the JSON Schema of project descriptions.
    Schema {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Summarize an archive's manifest.
    Inspect {
        archive: PathBuf,
        #[arg(long, value_enum, default_value_t = Format::Json)]
        format: Format,
    },
    /// Hash every file under a directory the way the archive stores them.
    Hash {
        assets: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Yaml,
}

#[derive(Serialize)]
struct ArchiveSummary {
    fingerprint: String,
    semver: String,
    agent: String,
    extensions: Vec<String>,
    assets: usize,
    targets: Vec<TargetSummary>,
}

#[derive(Serialize)]
struct TargetSummary {
    name: String,
    is_stage: bool,
    variables: Vec<String>,
    lists: Vec<String>,
    blocks: usize,
    costumes: Vec<String>,
    sounds: Vec<String>,
}

#[derive(Serialize)]
struct HashManifest {
    manifest_version: u16,
    assets: BTreeMap<String, HashEntry>,
}

#[derive(Serialize)]
struct HashEntry {
    /// Content-addressed entry name inside an archive.
    storage_key: String,
    sha256: String,
    size: u64,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.command {
        Command::Build {
            project,
            output,
            agent,
        } => build(&project, output, agent),
        Command::Decompile {
            archive,
            output,
            type_files,
        } => decompile(&archive, output, type_files),
        Command::Validate { project } => validate(&project),
        Command::Schema { output } => schema(output.as_deref()),
        Command::Inspect { archive, format } => inspect(&archive, format),
        Command::Hash { assets, output } => hash_assets(&assets, &output),
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Renders library errors with their diagnostic code, source and label.
fn report(err: FuseError) -> anyhow::Error {
    anyhow::anyhow!("{:?}", miette::Report::new(err))
}

fn print_warnings(warnings: &[Warning]) {
    for warning in warnings {
        eprintln!("warning: {warning}");
    }
}

fn build(project: &Path, output: PathBuf, agent: String) -> Result<()> {
    let options = BuildOptions { output, agent };
    let report_data = build_project(project, &options).map_err(report)?;
    print_warnings(&report_data.warnings);
    println!(
        "wrote {} ({} targets, {} assets) fingerprint={}",
        report_data.output.display(),
        report_data.manifest.targets.len(),
        report_data.asset_count,
        report_data.fingerprint
    );
    Ok(())
}

fn decompile(archive: &Path, output: PathBuf, type_files: Vec<PathBuf>) -> Result<()> {
    let options = DecompileOptions {
        output_dir: output,
        type_files,
    };
    let result = decompile_archive(archive, &options).map_err(report)?;
    print_warnings(&result.warnings);
    for (target, path) in &result.sources {
        println!("{target}: {}", path.display());
    }
    println!(
        "wrote {} ({} assets, {} synthesized modules)",
        result.description.display(),
        result.assets,
        result.synthesized.modules().len()
    );
    Ok(())
}

fn validate(project: &Path) -> Result<()> {
    let loaded = LoadedProject::load(project).map_err(report)?;
    let compiled = compile_in_memory(&FuseFrontend, &loaded, DEFAULT_AGENT).map_err(report)?;
    print_warnings(&compiled.warnings);
    println!(
        "{}: ok ({} targets, {} warnings)",
        project.display(),
        compiled.manifest.targets.len(),
        compiled.warnings.len()
    );
    Ok(())
}

fn schema(output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(&ProjectDescription::json_schema())?;
    match output {
        Some(path) => write_output(path, json),
        None => {
            println!("{json}");
            Ok(())
        }
    }
}

fn inspect(archive: &Path, format: Format) -> Result<()> {
    let (manifest, store) = read_archive(archive).map_err(report)?;
    let summary = ArchiveSummary {
        fingerprint: manifest.fingerprint().map_err(report)?,
        semver: manifest.meta.semver.clone(),
        agent: manifest.meta.agent.clone(),
        extensions: manifest.extensions.clone(),
        assets: store.len(),
        targets: manifest
            .targets
            .iter()
            .map(|target| TargetSummary {
                name: target.name.clone(),
                is_stage: target.is_stage,
                variables: target.variables.values().map(|v| v.0.clone()).collect(),
                lists: target.lists.values().map(|l| l.0.clone()).collect(),
                blocks: target.blocks.as_object().map_or(0, |blocks| blocks.len()),
                costumes: target.costumes.iter().map(|c| c.name.clone()).collect(),
                sounds: target.sounds.iter().map(|s| s.name.clone()).collect(),
            })
            .collect(),
    };
    let text = match format {
        Format::Json => serde_json::to_string_pretty(&summary)?,
        Format::Yaml => serde_yaml::to_string(&summary)?,
    };
    println!("{text}");
    Ok(())
}

fn hash_assets(root: &Path, output: &Path) -> Result<()> {
    let mut assets = BTreeMap::new();
    for entry in WalkDir::new(root).into_iter().filter_map(Result::ok) {
        let path = entry.path();
        if path.is_dir() {
            continue;
        }
        let rel = path.strip_prefix(root).unwrap_or(path);
        let rel_str = rel.to_string_lossy().replace('\\', "/");
        let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
        tracing::debug!(file = %rel_str, size = bytes.len(), "hashing asset");
        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        assets.insert(
            rel_str,
            HashEntry {
                storage_key: format!("{}.{extension}", content_hash(&bytes)),
                sha256: sha256_hex(&bytes),
                size: bytes.len() as u64,
            },
        );
    }
    let manifest = HashManifest {
        manifest_version: 1,
        assets,
    };
    write_output(output, serde_json::to_string_pretty(&manifest)?)
}

fn write_output(path: &Path, text: String) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, text).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_manifest_keys_files_by_relative_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(dir.path().join("art")).expect("mkdir");
        fs::write(dir.path().join("art").join("Cat.SVG"), b"<svg/>").expect("write");
        let out = dir.path().join("hashes").join("assets.json");

        hash_assets(dir.path(), &out).expect("hash");

        let text = fs::read_to_string(&out).expect("read manifest");
        let value: serde_json::Value = serde_json::from_str(&text).expect("json");
        let entry = &value["assets"]["art/Cat.SVG"];
        assert_eq!(entry["size"], 6);
        assert_eq!(entry["storage_key"], format!("{}.svg", content_hash(b"<svg/>")));
        assert_eq!(entry["sha256"].as_str().map(str::len), Some(64));
    }

    #[test]
    fn verbosity_flags_stack() {
        let cli = Cli::parse_from(["fusepack", "-vv", "validate", "project.toml"]);
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Command::Validate { .. }));
    }
}
