use clap::{Parser, Subcommand};
use imgforge::config;
use imgforge::engine::Engine;
use imgforge::output;
use imgforge::params::RawParams;
use std::path::{Path, PathBuf};

/// Transform parameters shared by commands that derive a result.
#[derive(clap::Args, Clone, Default)]
struct ParamArgs {
    /// Transform parameter as key=value (repeatable), e.g. -p width=200 -p filter=sepia
    #[arg(short = 'p', long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
    params: Vec<(String, String)>,
}

fn parse_param(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{s}'")),
    }
}

fn version_string() -> &'static str {
    let on_tag = env!("IMGFORGE_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("IMGFORGE_GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "imgforge")]
#[command(about = "Parameterized image transforms with a named-connection result cache")]
#[command(long_about = "\
Parameterized image transforms with a named-connection result cache

A transform takes a source reference (a path under the configured source
root, an asset:name, or an http(s) URL) and a set of key=value parameters:

  width, height, max, min, crop      geometry (pixels or N%)
  save_type, quality, bg_color       encoding
  flip, rotate                       orientation
  filter                             pipe-delimited filters, e.g. sepia|gaussian_blur,2
  rounded_corners, border            decorations
  watermark, reflection              overlays
  cache_duration                     seconds; -1 never expires, 0 skips the cache
  output                             bytes, url or tag

Results are stored under a deterministic key on a cache connection and
served from there on repeat requests.

Run 'imgforge filters' to list filters and 'imgforge gen-config' to generate
a documented imgforge.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Config file
    #[arg(long, default_value = config::DEFAULT_CONFIG_FILE, global = true)]
    config: PathBuf,

    /// Cache connection to use instead of the configured default
    #[arg(long, global = true)]
    connection: Option<String>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Transform one or more sources
    Transform {
        #[arg(required = true)]
        sources: Vec<String>,
        #[command(flatten)]
        params: ParamArgs,
        /// Write the result here (a directory when several sources are given)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Print the cache key a transform would use
    Key {
        source: String,
        #[command(flatten)]
        params: ParamArgs,
    },
    /// Remove every cached result of a source
    Invalidate { source: String },
    /// Reconcile a connection's index with its stored files
    Audit,
    /// List configured cache connections
    Connections,
    /// List available filters
    Filters,
    /// Print a stock imgforge.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Command::GenConfig = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;
    init_thread_pool(&cfg.processing);
    let engine = Engine::from_config(&cfg)?;
    if let Some(name) = &cli.connection {
        engine.set_default_connection(name)?;
    }

    match cli.command {
        Command::Transform { sources, params, out } => {
            let raw = raw_params(&params);
            let requests: Vec<(String, RawParams)> =
                sources.iter().map(|s| (s.clone(), raw.clone())).collect();
            let results = engine.transform_many(&requests);
            let mut failed = 0;
            for (source, result) in sources.iter().zip(results) {
                match result {
                    Ok(result) => {
                        let target = out
                            .as_deref()
                            .map(|out| output_path(out, source, result.format, sources.len()));
                        if let Some(target) = &target {
                            if let Some(parent) = target.parent() {
                                std::fs::create_dir_all(parent)?;
                            }
                            std::fs::write(target, &result.bytes)?;
                        }
                        output::print_transform_output(source, &result, target.as_deref());
                    }
                    Err(e) => {
                        failed += 1;
                        output::print_transform_error(source, &e);
                    }
                }
            }
            if failed > 0 {
                return Err(format!("{failed} of {} transforms failed", sources.len()).into());
            }
        }
        Command::Key { source, params } => {
            println!("{}", engine.cache_key(&source, &raw_params(&params))?);
        }
        Command::Invalidate { source } => {
            let removed = engine.invalidate(&source)?;
            println!("Invalidated {removed} cached results of {source}");
        }
        Command::Audit => {
            let report = engine.audit(None)?;
            output::print_audit_report(&report);
        }
        Command::Connections => {
            output::print_connections(&engine.list_connections());
        }
        Command::Filters => {
            output::print_filters(engine.filters());
        }
        Command::GenConfig => {}
    }

    Ok(())
}

/// Log to stderr at warn by default; each `-v` raises the level. `RUST_LOG`
/// wins when set.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}

fn raw_params(args: &ParamArgs) -> RawParams {
    args.params.iter().cloned().collect()
}

/// `out` itself for a single source; `out/<stem>.<ext>` when several
/// sources share one output directory.
fn output_path(
    out: &Path,
    source: &str,
    format: imgforge::imaging::OutputFormat,
    count: usize,
) -> PathBuf {
    if count == 1 {
        return out.to_path_buf();
    }
    let stem = Path::new(source.rsplit(['/', '\\']).next().unwrap_or(source))
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    out.join(format!("{stem}.{}", format.extension()))
}
