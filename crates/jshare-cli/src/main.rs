use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use jshare_archive::{ArchiveBuilder, ArchiveLoader, BuildReport, LoadReport};
use jshare_classlist::{convert, convert_list, ClassList};
use jshare_config::{ArchiveCompression, JshareConfig};
use jshare_registry::{ClassLoader, ClassLoaderRegistry, ClasspathEntry};
use serde::Serialize;

#[derive(Parser)]
#[command(
    name = "jshare",
    version,
    about = "Class-metadata sharing: classlists, archive dump and load"
)]
struct Cli {
    /// Config file (defaults to ./jshare.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log level or filter directives; overrides `logging.level`
    #[arg(long, global = true)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply the selection policy to a raw classlist
    Convert(ConvertArgs),
    /// Build a shared archive from a classlist
    Dump(DumpArgs),
    /// Map an archive and report how each entry binds
    Load(LoadArgs),
    /// Print an archive header without validating the payload
    Inspect(InspectArgs),
}

#[derive(Args)]
struct ConvertArgs {
    input: PathBuf,
    output: PathBuf,
    /// Emit JSON suitable for CI
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct LoaderArgs {
    /// Register a custom loader: `<identifier>=<classpath>` where the
    /// classpath uses the platform path separator
    #[arg(long = "loader", value_name = "ID=CLASSPATH")]
    loaders: Vec<String>,
    /// Runtime type of loaders given with `--loader`
    #[arg(long, default_value = "java/net/URLClassLoader")]
    loader_type: String,
}

#[derive(Args)]
struct DumpArgs {
    #[arg(long)]
    classlist: PathBuf,
    #[arg(long)]
    archive: PathBuf,
    /// Metaspace budget, e.g. `12M`
    #[arg(long)]
    max_metaspace: Option<String>,
    #[arg(long, value_enum)]
    compression: Option<CompressionArg>,
    #[command(flatten)]
    loaders: LoaderArgs,
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct LoadArgs {
    #[arg(long)]
    archive: PathBuf,
    #[command(flatten)]
    loaders: LoaderArgs,
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct InspectArgs {
    #[arg(long)]
    archive: PathBuf,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum CompressionArg {
    None,
    Zstd,
}

impl From<CompressionArg> for ArchiveCompression {
    fn from(value: CompressionArg) -> Self {
        match value {
            CompressionArg::None => ArchiveCompression::None,
            CompressionArg::Zstd => ArchiveCompression::Zstd,
        }
    }
}

/// Exit code for a clean metaspace-exhaustion abort.
const EXIT_EXHAUSTED: i32 = 1;

fn main() {
    let cli = Cli::parse();
    let exit_code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            2
        }
    };

    std::process::exit(exit_code);
}

fn run(cli: Cli) -> Result<i32> {
    let cwd = std::env::current_dir().context("failed to determine current directory")?;
    let mut config = JshareConfig::discover(cli.config.as_deref(), &cwd)?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    jshare_config::init_tracing(&config.logging);

    let config_dir = cli
        .config
        .as_deref()
        .and_then(Path::parent)
        .map(|dir| cwd.join(dir))
        .unwrap_or_else(|| cwd.clone());

    match cli.command {
        Command::Convert(args) => {
            let text = std::fs::read_to_string(&args.input)
                .with_context(|| format!("failed to read {}", args.input.display()))?;
            let converted = convert(&text, &config.classlist)?;
            converted.write(&args.output)?;
            let report = ConvertReport {
                output: args.output,
                classes: converted.len(),
            };
            print_output(&report, args.json)?;
            Ok(0)
        }
        Command::Dump(args) => {
            let registry = ClassLoaderRegistry::global();
            let _loaders = register_loaders(registry, &config, &config_dir, &args.loaders)?;

            let budget = match &args.max_metaspace {
                Some(size) => jshare_config::parse_budget(size)?,
                None => config.dump.budget()?,
            };
            let compression = args
                .compression
                .map(ArchiveCompression::from)
                .unwrap_or(config.dump.compression);

            let list = ClassList::read(&args.classlist)?;
            let list = convert_list(&list, &config.classlist);

            let result = ArchiveBuilder::new(registry, budget)
                .with_region_shares(config.dump.regions)
                .with_compression(compression.into())
                .build(&list, &args.archive);
            match result {
                Ok(report) => {
                    print_output(&report, args.json)?;
                    Ok(0)
                }
                Err(err) if err.is_exhaustion() => {
                    eprintln!("{err}");
                    Ok(EXIT_EXHAUSTED)
                }
                Err(err) => Err(err).context("archive dump failed"),
            }
        }
        Command::Load(args) => {
            let registry = ClassLoaderRegistry::global();
            let _loaders = register_loaders(registry, &config, &config_dir, &args.loaders)?;
            let loaded = ArchiveLoader::new(registry)
                .load(&args.archive)
                .with_context(|| format!("failed to load archive {}", args.archive.display()))?;
            print_output(&loaded.report(), args.json)?;
            Ok(0)
        }
        Command::Inspect(args) => {
            let header = jshare_archive::read_archive_header(&args.archive)
                .with_context(|| format!("failed to read archive {}", args.archive.display()))?;
            let report = HeaderReport {
                archive: args.archive,
                schema_version: header.schema_version,
                engine_version: header.engine_version,
                endian: format!("{:?}", header.endian).to_ascii_lowercase(),
                pointer_width: header.pointer_width,
                compression: format!("{:?}", header.compression).to_ascii_lowercase(),
                payload_len: header.payload_len,
                uncompressed_len: header.uncompressed_len,
                content_hash: format!("{:016x}", header.content_hash),
                budget_bytes: header.summary.budget_bytes,
                entry_count: header.summary.entry_count,
            };
            print_output(&report, true)?;
            Ok(0)
        }
    }
}

/// Registers configured and command-line loaders in `registry`.
///
/// The registry only holds weak handles, so the returned loaders must be kept
/// alive for the rest of the command.
fn register_loaders(
    registry: &ClassLoaderRegistry,
    config: &JshareConfig,
    config_dir: &Path,
    args: &LoaderArgs,
) -> Result<Vec<Arc<ClassLoader>>> {
    let mut loaders = Vec::new();
    for entry in &config.loaders {
        let loader = Arc::new(entry.to_loader(config_dir));
        registry
            .register(Some(&entry.identifier), Some(&loader))
            .with_context(|| format!("failed to register loader {}", entry.identifier))?;
        loaders.push(loader);
    }
    for spec in &args.loaders {
        let (identifier, classpath) = spec
            .split_once('=')
            .with_context(|| format!("invalid --loader {spec:?}; expected ID=CLASSPATH"))?;
        let classpath = std::env::split_paths(classpath)
            .map(ClasspathEntry::from_path)
            .collect();
        let loader = Arc::new(ClassLoader::custom(args.loader_type.as_str(), classpath));
        registry
            .register(Some(identifier), Some(&loader))
            .with_context(|| format!("failed to register loader {identifier}"))?;
        tracing::debug!(
            target = "jshare.cli",
            identifier,
            loader_type = loader.type_name(),
            "registered class loader"
        );
        loaders.push(loader);
    }
    Ok(loaders)
}

#[derive(Serialize)]
struct ConvertReport {
    output: PathBuf,
    classes: usize,
}

#[derive(Serialize)]
struct HeaderReport {
    archive: PathBuf,
    schema_version: u32,
    engine_version: String,
    endian: String,
    pointer_width: u8,
    compression: String,
    payload_len: u64,
    uncompressed_len: u64,
    content_hash: String,
    budget_bytes: u64,
    entry_count: u64,
}

fn print_output<T: Serialize + 'static>(value: &T, json: bool) -> Result<()> {
    if json {
        let out = serde_json::to_string_pretty(value)?;
        println!("{out}");
        return Ok(());
    }

    // Human output for key types. Everything else falls back to pretty JSON.
    let any = value as &dyn std::any::Any;
    if let Some(report) = any.downcast_ref::<ConvertReport>() {
        println!(
            "wrote {} classes to {}",
            report.classes,
            report.output.display()
        );
    } else if let Some(report) = any.downcast_ref::<BuildReport>() {
        println!("archive: {}", report.archive.display());
        println!("  classes: {}", report.classes);
        println!("  skipped: {}", report.skipped.len());
        for region in &report.regions {
            println!(
                "  {}: {}/{} bytes",
                region.kind, region.used, region.capacity
            );
        }
    } else if let Some(report) = any.downcast_ref::<LoadReport>() {
        println!("archive: {}", report.archive.display());
        println!("  entries: {}", report.entries);
        println!("  shared: {}", report.shared);
        for fallback in &report.fallbacks {
            println!("  fallback: {} ({})", fallback.name, fallback.mismatch);
        }
    } else {
        let out = serde_json::to_string_pretty(value)?;
        println!("{out}");
    }
    Ok(())
}
