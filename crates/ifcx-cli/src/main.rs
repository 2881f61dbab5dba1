//! ifcx CLI
//!
//! - `convert`: IFC → SQLite / `.frag`, and `.frag` → SQLite
//! - `guid`: compact 22-character GlobalId ↔ canonical GUID
//! - `formats`: list the registered decoders and encoders

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use colored::Colorize;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use ifcx_model::guid::{global_id_to_guid, guid_to_global_id};
use ifcx_pipeline::{detect_format, init_global, ConvertConfig, Converter, Registry};

#[derive(Parser)]
#[command(name = "ifcx")]
#[command(author, version, about = "Convert IFC building models to SQLite and .frag")]
struct Cli {
    /// More logging on stderr (`-v` info, `-vv` debug). `RUST_LOG` wins.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a model file. Formats default to the file extensions.
    Convert(ConvertArgs),

    /// Translate a GlobalId: compact → canonical GUID, or GUID → compact.
    Guid {
        /// 22-character compact id or `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx`
        id: String,
    },

    /// List registered decoders and encoders.
    Formats {
        #[command(flatten)]
        config: ConfigArgs,
    },
}

#[derive(Args)]
struct ConvertArgs {
    input: PathBuf,
    output: PathBuf,
    /// Override the format detected from the input extension
    #[arg(long)]
    input_format: Option<String>,
    /// Override the format detected from the output extension
    #[arg(long)]
    output_format: Option<String>,
    #[command(flatten)]
    config: ConfigArgs,
    /// Exit non-zero when the conversion fails
    #[arg(long)]
    strict: bool,
}

#[derive(Args)]
struct ConfigArgs {
    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Execution environment used for plugin lookup
    #[arg(long)]
    env: Option<String>,
    /// Run decoders on a background worker thread
    #[arg(long)]
    worker: bool,
}

impl ConfigArgs {
    /// Defaults, then the config file, then `IFCX_*` variables, then flags.
    fn resolve(&self) -> Result<ConvertConfig> {
        let mut config = match &self.config {
            Some(path) => ConvertConfig::load(path)?,
            None => ConvertConfig::default(),
        };
        config.apply_env();
        if let Some(env) = &self.env {
            config.environment = env.clone();
        }
        if self.worker {
            config.decode_in_worker = true;
        }
        Ok(config)
    }
}

/// The process-wide registry unless something overrides the defaults.
fn registry_for(config: &ConvertConfig) -> Arc<Registry> {
    if *config == ConvertConfig::default() {
        init_global()
    } else {
        Arc::new(Registry::with_builtins(config))
    }
}

fn init_tracing(verbose: u8) {
    let fallback = match verbose {
        0 => "ifcx=warn",
        1 => "ifcx=info",
        _ => "ifcx=debug",
    };
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)))
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Convert(args) => cmd_convert(&args),
        Commands::Guid { id } => cmd_guid(&id),
        Commands::Formats { config } => cmd_formats(&config),
    }
}

fn cmd_convert(args: &ConvertArgs) -> Result<()> {
    match run_convert(args) {
        Ok(()) => Ok(()),
        Err(err) if args.strict => Err(err),
        Err(err) => {
            eprintln!("{} {:#}", "error:".red().bold(), err);
            Ok(())
        }
    }
}

fn run_convert(args: &ConvertArgs) -> Result<()> {
    let config = args.config.resolve()?;
    let input_format = match &args.input_format {
        Some(format) => format.to_ascii_lowercase(),
        None => detect_format(&args.input)?,
    };
    let output_format = match &args.output_format {
        Some(format) => format.to_ascii_lowercase(),
        None => detect_format(&args.output)?,
    };

    println!(
        "{} {} ({}) → {} ({})",
        "Converting".green().bold(),
        args.input.display(),
        input_format.cyan(),
        args.output.display(),
        output_format.cyan()
    );

    let input = fs::read(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    let converter = Converter::from_config(registry_for(&config), &config);

    let started = Instant::now();
    let output = converter.convert(input, &input_format, &output_format, &mut |percent| {
        println!("  {} {:>3}%", "→".yellow(), percent);
    })?;

    fs::write(&args.output, &output)
        .with_context(|| format!("writing {}", args.output.display()))?;
    println!(
        "{} {} ({} bytes, {:.2?})",
        "wrote".green().bold(),
        args.output.display().to_string().bold(),
        output.len(),
        started.elapsed()
    );
    Ok(())
}

fn cmd_guid(id: &str) -> Result<()> {
    let id = id.trim();
    let translated = if id.len() == 22 {
        global_id_to_guid(id)?
    } else {
        guid_to_global_id(id)?
    };
    println!("{} {}", id.yellow(), translated.green().bold());
    Ok(())
}

fn cmd_formats(args: &ConfigArgs) -> Result<()> {
    let config = args.resolve()?;
    let registry = registry_for(&config);

    println!("{} (environment {})", "Decoders".green().bold(), config.environment.cyan());
    for d in registry.decoders() {
        println!(
            "  {:<14} formats [{}]  envs [{}]  priority {}  produces [{}]",
            d.name.yellow(),
            d.formats.join(", "),
            d.environments.join(", "),
            d.priority,
            d.shapes.join(", ")
        );
    }
    println!("{}", "Encoders".green().bold());
    for e in registry.encoders() {
        println!(
            "  {:<14} formats [{}]  envs [{}]  priority {}  consumes [{}]",
            e.name.yellow(),
            e.formats.join(", "),
            e.environments.join(", "),
            e.priority,
            e.shapes.join(", ")
        );
    }
    Ok(())
}
