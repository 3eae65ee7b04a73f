// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use mts_cli::{
    AnalysisConfig, AnalysisReport, ReferenceChoice, config_from_json, dataset_from_json,
    render_lag_summary, render_reference, render_timing_summary, run_analysis, run_detection,
};
use mts_core::{ExecutionContext, MooringDataset, MtsError};
use mts_detect::DeploymentAnnotations;
use serde::Serialize;
use std::env;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::str::FromStr;

struct Cli {
    command: Command,
}

enum Command {
    Analyze(AnalyzeArgs),
    Detect(DetectArgs),
}

#[derive(Debug, Default)]
struct AnalyzeArgs {
    input: PathBuf,
    config: Option<PathBuf>,
    reference: Option<usize>,
    sub_sample: Option<usize>,
    bin_width: Option<f64>,
    output: Option<PathBuf>,
    summary: bool,
}

#[derive(Debug, Default)]
struct DetectArgs {
    input: PathBuf,
    config: Option<PathBuf>,
    output: Option<PathBuf>,
}

#[derive(Debug)]
enum CliError {
    Mts(MtsError),
    Io {
        context: String,
        source: std::io::Error,
    },
    Json {
        context: String,
        source: serde_json::Error,
    },
    InvalidInput(String),
}

impl CliError {
    fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Json {
            context: context.into(),
            source,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::Mts(MtsError::InvalidInput(_)) | Self::InvalidInput(_) => "invalid_input",
            Self::Mts(MtsError::NumericalIssue(_)) => "numerical_issue",
            Self::Mts(MtsError::NoConsensus(_)) => "no_consensus",
            Self::Mts(MtsError::Cancelled) => "cancelled",
            Self::Io { .. } => "io_error",
            Self::Json { .. } => "json_error",
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mts(err) => write!(f, "{err}"),
            Self::Io { context, source } => write!(f, "{context}: {source}"),
            Self::Json { context, source } => write!(f, "{context}: {source}"),
            Self::InvalidInput(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Mts(err) => Some(err),
            Self::Io { source, .. } => Some(source),
            Self::Json { source, .. } => Some(source),
            Self::InvalidInput(_) => None,
        }
    }
}

impl From<MtsError> for CliError {
    fn from(value: MtsError) -> Self {
        Self::Mts(value)
    }
}

#[derive(Serialize)]
struct InputSummary {
    path: String,
    n_levels: usize,
    n_samples: usize,
}

impl InputSummary {
    fn new(path: &Path, dataset: &MooringDataset) -> Self {
        Self {
            path: path.display().to_string(),
            n_levels: dataset.n_levels(),
            n_samples: dataset.n_samples(),
        }
    }
}

#[derive(Serialize)]
struct AnalyzeOutput<'a> {
    command: &'static str,
    input: InputSummary,
    report: &'a AnalysisReport,
}

#[derive(Serialize)]
struct DetectOutput {
    command: &'static str,
    input: InputSummary,
    config: AnalysisConfig,
    annotations: DeploymentAnnotations,
}

#[derive(Serialize)]
struct ErrorEnvelope {
    error: ErrorPayload,
}

#[derive(Serialize)]
struct ErrorPayload {
    code: String,
    message: String,
}

fn main() {
    init_tracing();
    if let Err(err) = run() {
        report_error(&err);
        process::exit(1);
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run() -> Result<(), CliError> {
    let args = env::args().skip(1).collect::<Vec<_>>();
    let Some(cli) = parse_cli(&args)? else {
        return Ok(());
    };

    match cli.command {
        Command::Analyze(args) => handle_analyze(args),
        Command::Detect(args) => handle_detect(args),
    }
}

fn parse_cli(args: &[String]) -> Result<Option<Cli>, CliError> {
    if args.is_empty() || matches!(args[0].as_str(), "-h" | "--help") {
        print_root_help();
        return Ok(None);
    }
    if matches!(args[0].as_str(), "-V" | "--version") {
        print_version();
        return Ok(None);
    }

    let command_name = args[0].as_str();
    let rest = &args[1..];

    if rest
        .iter()
        .any(|arg| matches!(arg.as_str(), "-h" | "--help"))
    {
        print_command_help(command_name)?;
        return Ok(None);
    }
    if rest
        .iter()
        .any(|arg| matches!(arg.as_str(), "-V" | "--version"))
    {
        print_version();
        return Ok(None);
    }

    let command = match command_name {
        "analyze" => Command::Analyze(parse_analyze_args(rest)?),
        "detect" => Command::Detect(parse_detect_args(rest)?),
        _ => {
            return Err(CliError::invalid_input(format!(
                "unknown command '{command_name}'; expected one of: analyze, detect"
            )));
        }
    };

    Ok(Some(Cli { command }))
}

fn parse_analyze_args(tokens: &[String]) -> Result<AnalyzeArgs, CliError> {
    let mut flags = FlagReader::new("analyze", tokens);
    let mut args = AnalyzeArgs::default();
    while let Some(name) = flags.next_flag()? {
        match name {
            "input" => args.input = flags.path(name)?,
            "config" => args.config = Some(flags.path(name)?),
            "reference" => args.reference = Some(flags.parsed(name, "a level index")?),
            "sub-sample" => args.sub_sample = Some(flags.parsed(name, "a sample stride")?),
            "bin-width" => args.bin_width = Some(flags.parsed(name, "a width in seconds")?),
            "output" => args.output = Some(flags.path(name)?),
            "summary" => args.summary = flags.switch(name)?,
            other => return Err(flags.unknown(other)),
        }
    }
    if args.input.as_os_str().is_empty() {
        return Err(flags.error("--input <dataset.json> is required"));
    }
    Ok(args)
}

fn parse_detect_args(tokens: &[String]) -> Result<DetectArgs, CliError> {
    let mut flags = FlagReader::new("detect", tokens);
    let mut args = DetectArgs::default();
    while let Some(name) = flags.next_flag()? {
        match name {
            "input" => args.input = flags.path(name)?,
            "config" => args.config = Some(flags.path(name)?),
            "output" => args.output = Some(flags.path(name)?),
            other => return Err(flags.unknown(other)),
        }
    }
    if args.input.as_os_str().is_empty() {
        return Err(flags.error("--input <dataset.json> is required"));
    }
    Ok(args)
}

/// Walks the `--name value` and `--name=value` options of one subcommand.
struct FlagReader<'a> {
    command: &'static str,
    tokens: &'a [String],
    pos: usize,
    inline: Option<&'a str>,
}

impl<'a> FlagReader<'a> {
    fn new(command: &'static str, tokens: &'a [String]) -> Self {
        Self {
            command,
            tokens,
            pos: 0,
            inline: None,
        }
    }

    /// Next option name without its dashes; an `=value` suffix is held for the reader.
    fn next_flag(&mut self) -> Result<Option<&'a str>, CliError> {
        let tokens = self.tokens;
        let Some(token) = tokens.get(self.pos) else {
            return Ok(None);
        };
        self.pos += 1;
        let Some(option) = token.strip_prefix("--") else {
            return Err(self.error(format!(
                "stray argument '{token}'; options are written --name <value>"
            )));
        };
        let (name, inline) = match option.split_once('=') {
            Some((name, value)) => (name, Some(value)),
            None => (option, None),
        };
        self.inline = inline;
        Ok(Some(name))
    }

    fn value(&mut self, name: &str) -> Result<&'a str, CliError> {
        if let Some(value) = self.inline.take() {
            return Ok(value);
        }
        let tokens = self.tokens;
        match tokens.get(self.pos) {
            Some(next) if !next.starts_with("--") => {
                self.pos += 1;
                Ok(next.as_str())
            }
            Some(next) => Err(self.error(format!(
                "--{name} is missing its value (found option '{next}')"
            ))),
            None => Err(self.error(format!("--{name} is missing its value"))),
        }
    }

    fn path(&mut self, name: &str) -> Result<PathBuf, CliError> {
        self.value(name).map(PathBuf::from)
    }

    fn parsed<T: FromStr>(&mut self, name: &str, expected: &str) -> Result<T, CliError> {
        let raw = self.value(name)?;
        raw.parse()
            .map_err(|_| self.error(format!("--{name} takes {expected}; got '{raw}'")))
    }

    fn switch(&mut self, name: &str) -> Result<bool, CliError> {
        match self.inline.take() {
            Some(value) => Err(self.error(format!(
                "--{name} is a switch and takes no value; got '{value}'"
            ))),
            None => Ok(true),
        }
    }

    fn unknown(&self, name: &str) -> CliError {
        self.error(format!("unknown option --{name}"))
    }

    fn error(&self, message: impl fmt::Display) -> CliError {
        CliError::invalid_input(format!("mts {}: {message}", self.command))
    }
}

fn print_version() {
    println!("mts {}", env!("CARGO_PKG_VERSION"));
}

fn print_root_help() {
    println!(
        "mts {}\n\nUSAGE:\n  mts <COMMAND> [OPTIONS]\n\nCOMMANDS:\n  analyze   Detect deployments, resolve consensus timing and estimate clock offsets\n  detect    Detect per-level deployment boundaries only\n\nGLOBAL OPTIONS:\n  -h, --help      Show help\n  -V, --version   Show version\n\nLogging is controlled with RUST_LOG (default: warn).\nRun 'mts <COMMAND> --help' for subcommand options.",
        env!("CARGO_PKG_VERSION")
    );
}

fn print_command_help(command: &str) -> Result<(), CliError> {
    match command {
        "analyze" => {
            println!(
                "USAGE:\n  mts analyze --input <dataset.json> [OPTIONS]\n\nOPTIONS:\n  --input <path>          Required dataset JSON\n  --config <path>         Analysis config JSON; absent fields keep defaults\n  --reference <usize>     Fix the lag-correlation reference level\n  --sub-sample <usize>    Lag-correlation stride. Default: 5\n  --bin-width <float>     Consensus histogram bin width in seconds. Default: 60\n  --output <path>         Write JSON report to file\n  --summary               Print timing, reference and lag tables"
            );
            Ok(())
        }
        "detect" => {
            println!(
                "USAGE:\n  mts detect --input <dataset.json> [OPTIONS]\n\nOPTIONS:\n  --input <path>          Required dataset JSON\n  --config <path>         Analysis config JSON; only 'deployment' is used\n  --output <path>         Write JSON output to file"
            );
            Ok(())
        }
        _ => Err(CliError::invalid_input(format!(
            "unknown command '{command}'; expected one of: analyze, detect"
        ))),
    }
}

fn load_dataset(path: &Path) -> Result<MooringDataset, CliError> {
    let raw = read_text(path)?;
    Ok(dataset_from_json(raw.as_str())?)
}

fn load_config(path: Option<&Path>) -> Result<AnalysisConfig, CliError> {
    match path {
        Some(path) => Ok(config_from_json(read_text(path)?.as_str())?),
        None => Ok(AnalysisConfig::default()),
    }
}

fn apply_overrides(config: &mut AnalysisConfig, args: &AnalyzeArgs) {
    if let Some(index) = args.reference {
        config.reference = ReferenceChoice::Fixed(index);
    }
    if let Some(sub_sample) = args.sub_sample {
        config.lag.sub_sample = sub_sample;
    }
    if let Some(bin_width) = args.bin_width {
        config.consensus.bin_width_sec = bin_width;
    }
}

fn handle_analyze(args: AnalyzeArgs) -> Result<(), CliError> {
    let dataset = load_dataset(args.input.as_path())?;
    let mut config = load_config(args.config.as_deref())?;
    apply_overrides(&mut config, &args);

    let report = run_analysis(&dataset, &config, &ExecutionContext::new())?;

    if args.summary {
        println!("{}", render_timing_summary(&dataset, &report));
        println!("{}", render_reference(&dataset, &report));
        println!("{}", render_lag_summary(&dataset, &report));
        if args.output.is_none() {
            return Ok(());
        }
    }

    write_json_output(
        &AnalyzeOutput {
            command: "analyze",
            input: InputSummary::new(args.input.as_path(), &dataset),
            report: &report,
        },
        args.output.as_deref(),
    )
}

fn handle_detect(args: DetectArgs) -> Result<(), CliError> {
    let dataset = load_dataset(args.input.as_path())?;
    let config = load_config(args.config.as_deref())?;
    let annotations = run_detection(&dataset, &config, &ExecutionContext::new())?;

    write_json_output(
        &DetectOutput {
            command: "detect",
            input: InputSummary::new(args.input.as_path(), &dataset),
            config,
            annotations,
        },
        args.output.as_deref(),
    )
}

fn read_text(path: &Path) -> Result<String, CliError> {
    fs::read_to_string(path)
        .map_err(|source| CliError::io(format!("failed to read '{}'", path.display()), source))
}

fn write_json_output<T: Serialize>(
    payload: &T,
    output_path: Option<&Path>,
) -> Result<(), CliError> {
    match output_path {
        Some(path) => {
            let file = fs::File::create(path).map_err(|source| {
                CliError::io(format!("cannot create report '{}'", path.display()), source)
            })?;
            write_pretty(io::BufWriter::new(file), payload)
        }
        None => write_pretty(io::stdout().lock(), payload),
    }
}

fn write_pretty<W: Write, T: Serialize>(mut writer: W, payload: &T) -> Result<(), CliError> {
    serde_json::to_writer_pretty(&mut writer, payload)
        .map_err(|source| CliError::json("cannot encode report as JSON", source))?;
    writeln!(writer)
        .and_then(|()| writer.flush())
        .map_err(|source| CliError::io("cannot finish writing report", source))
}

/// One-line JSON error envelope on stderr.
fn report_error(err: &CliError) {
    let envelope = ErrorEnvelope {
        error: ErrorPayload {
            code: err.code().to_string(),
            message: err.to_string(),
        },
    };
    match serde_json::to_string(&envelope) {
        Ok(line) => eprintln!("{line}"),
        Err(_) => eprintln!("mts: {}: {err}", err.code()),
    }
}
