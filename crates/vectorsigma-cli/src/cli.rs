//! Command-line interface for the vectorsigma generator
//!
//! Provides a CLI to generate Rust state machine packages from PlantUML
//! state diagrams and to inspect the parsed model.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use vectorsigma::core::logging::init_logging;
use vectorsigma::generator::{GeneratorConfig, DEFAULT_PACKAGE};
use vectorsigma::uml::{extract_plantuml, Fsm, UmlParser};

/// VectorSigma - generate Rust state machines from PlantUML diagrams
#[derive(Parser)]
#[command(name = "vectorsigma")]
#[command(about = "Generate Rust finite state machines from PlantUML state diagrams")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(author = env!("CARGO_PKG_AUTHORS"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Set log level (trace|debug|info|warn|error)
    #[arg(long, value_enum, default_value_t = LogLevel::Warn, global = true)]
    pub log_level: LogLevel,

    /// Set log format (compact|pretty|json)
    #[arg(long, value_enum, default_value_t = LogFormat::Compact, global = true)]
    pub log_format: LogFormat,
}

/// Log level options
#[derive(Copy, Clone, Debug, clap::ValueEnum, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Log format options
#[derive(Copy, Clone, Debug, clap::ValueEnum, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogFormat::Compact => "compact",
            LogFormat::Pretty => "pretty",
            LogFormat::Json => "json",
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate a state machine package from a diagram
    Generate {
        /// Diagram file (.puml, or .md with a ```plantuml block)
        #[arg(short, long)]
        input: PathBuf,

        /// Output directory (defaults to the current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Name of the generated package
        #[arg(short, long, default_value = DEFAULT_PACKAGE)]
        package: String,

        /// Crate name when initializing (defaults to the current directory name)
        #[arg(short, long)]
        module: Option<String>,

        /// Initialize a new crate instead of adding a package
        #[arg(long)]
        init: bool,
    },

    /// Parse a diagram and show the resulting model
    Inspect {
        /// Diagram file (use - for stdin)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Show in JSON format
        #[arg(long)]
        json: bool,
    },
}

impl Commands {
    /// Build the generator options of a `generate` command
    pub fn generator_config(&self) -> Option<GeneratorConfig> {
        let Commands::Generate {
            input,
            output,
            package,
            module,
            init,
        } = self
        else {
            return None;
        };

        let mut config = GeneratorConfig::new(input)
            .with_package(package)
            .with_init(*init);
        if let Some(output) = output {
            config = config.with_output(output);
        }
        if let Some(module) = module {
            config = config.with_module(module);
        }
        Some(config)
    }
}

/// Main CLI application
#[derive(Default)]
pub struct VectorSigmaApp;

impl VectorSigmaApp {
    pub fn new() -> Self {
        Self
    }

    /// Run the application with the given CLI arguments
    pub fn run(&mut self, cli: Cli) -> Result<()> {
        // Environment variables take precedence over flags
        let log_level_str = std::env::var("VECTORSIGMA_LOG_LEVEL")
            .ok()
            .or_else(|| std::env::var("RUST_LOG").ok())
            .or_else(|| Some(cli.log_level.as_str().to_string()));

        let log_format_str = std::env::var("VECTORSIGMA_LOG_FORMAT")
            .ok()
            .or_else(|| Some(cli.log_format.as_str().to_string()));

        if let Err(e) = init_logging(log_level_str.as_deref(), log_format_str.as_deref()) {
            eprintln!("Warning: Failed to initialize logging: {}", e);
        }

        if cli.verbose {
            eprintln!("VectorSigma v{}", env!("CARGO_PKG_VERSION"));
        }

        match &cli.command {
            Commands::Generate { .. } => {
                let config = cli
                    .command
                    .generator_config()
                    .context("invalid generate arguments")?;
                self.generate_command(config, cli.verbose)
            }
            Commands::Inspect { input, json } => {
                self.inspect_command(input.clone(), *json, cli.verbose)
            }
        }
    }

    /// Handle the generate command
    fn generate_command(&self, config: GeneratorConfig, verbose: bool) -> Result<()> {
        if verbose {
            eprintln!("Generating package '{}' from {}", config.package, config.input.display());
        }

        let written = vectorsigma::pipeline::run(config)?;
        info!(files = written.len(), "Generate command finished");

        if verbose {
            for path in &written {
                eprintln!("  wrote {}", path.display());
            }
        }
        println!("Generated {} file(s)", written.len());
        Ok(())
    }

    /// Handle the inspect command
    fn inspect_command(&self, input: Option<PathBuf>, json: bool, verbose: bool) -> Result<()> {
        let fsm = self.load_model(input)?;

        if verbose {
            eprintln!("Parsed {} top-level state(s)", fsm.state_count());
        }

        if json {
            println!("{}", serde_json::to_string_pretty(&fsm)?);
        } else {
            print!("{}", summary(&fsm));
        }
        Ok(())
    }

    /// Read and parse a diagram, extracting it from Markdown when needed
    pub fn load_model(&self, input: Option<PathBuf>) -> Result<Fsm> {
        let is_markdown = input
            .as_deref()
            .and_then(Path::extension)
            .is_some_and(|ext| ext == "md");
        let content = self.read_input(input)?;

        let diagram = if is_markdown {
            debug!("Extracting plantuml block from markdown");
            extract_plantuml(&content)?
        } else {
            content.as_str()
        };
        Ok(UmlParser::new().parse(diagram))
    }

    /// Read input from file or stdin
    pub fn read_input(&self, input: Option<PathBuf>) -> Result<String> {
        match input {
            Some(path) if path.to_string_lossy() != "-" => fs::read_to_string(&path)
                .with_context(|| format!("Failed to read input file '{}'", path.display())),
            _ => {
                let mut content = String::new();
                io::stdin().read_to_string(&mut content)?;
                if content.trim().is_empty() {
                    return Err(anyhow!("No diagram on stdin"));
                }
                Ok(content)
            }
        }
    }
}

/// Human readable overview of a model
pub fn summary(fsm: &Fsm) -> String {
    let title = if fsm.title.is_empty() {
        "(untitled)"
    } else {
        fsm.title.as_str()
    };

    let mut out = format!("Title:   {}\n", title);
    out.push_str(&format!("States:  {}\n", fsm.all_states.join(", ")));
    out.push_str(&format!("Actions: {}\n", fsm.action_names.join(", ")));
    out.push_str(&format!("Guards:  {}\n", fsm.guard_names.join(", ")));
    out.push_str(&format!("Depth:   {}\n", fsm.depth()));
    out
}
