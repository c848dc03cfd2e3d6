//! flagpole - build out the demo registry for a set of flags and print the result.

mod demo;

use clap::{Parser, crate_version};
use convenient_flags::{BuildOptions, ResultMap};
use serde_json::Value;
use tracing::{Level, info, span};
use tracing_subscriber::FmtSubscriber;

/// Options for the application.
#[derive(Parser)]
#[clap(version = crate_version!(), about = "Build out a result mapping from requested flags")]
struct Opts {
    /// Flags to request, separated by `|` or `,` (e.g. "PEOPLE|HOBBIES").
    #[clap(short, long, default_value = "ALL", env = "FLAGPOLE_FLAGS")]
    flags: String,

    /// Build options as JSON; the flags below are applied on top.
    #[clap(long, env = "FLAGPOLE_OPTIONS")]
    options: Option<String>,

    /// Hand every producer a snapshot of the result so far.
    #[clap(short, long)]
    snapshot_always: bool,

    /// JSON object the result starts from.
    #[clap(long)]
    seed: Option<String>,

    /// Positional argument forwarded to every producer (JSON, or a plain string).
    #[clap(short, long = "arg")]
    args: Vec<String>,

    /// Also forward the live result as a positional argument.
    #[clap(long)]
    live_arg: bool,

    /// Keyword argument forwarded to every producer, as `name=value`.
    #[clap(short, long = "kwarg")]
    kwargs: Vec<String>,

    /// List the available flags and exit.
    #[clap(long)]
    list: bool,

    /// Log level (debug, info, warn, error).
    #[clap(long, default_value = "warn", env = "FLAGPOLE_LOG")]
    log_level: String,

    /// Print debug information
    #[clap(short)]
    debug: bool,
}

/// Gets the log level enum variant from a level string.
///
/// Unknown strings fall back to `INFO`.
pub fn get_log_level(level: &str) -> Level {
    match level.to_uppercase().as_ref() {
        "TRACE" => Level::TRACE,
        "DEBUG" => Level::DEBUG,
        "WARN" => Level::WARN,
        "ERROR" | "FATAL" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Parse an argument as JSON, keeping it as a string when it is not.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn build_options(opts: &Opts) -> Result<BuildOptions, String> {
    let mut options = match opts.options.as_deref() {
        Some(raw) => serde_json::from_str::<BuildOptions>(raw)
            .map_err(|err| format!("options are not valid build options: {err}"))?,
        None => BuildOptions::new(),
    };
    if opts.snapshot_always {
        options = options.pass_snapshot_always(true);
    }
    for raw in &opts.args {
        options = options.arg(parse_value(raw));
    }
    if opts.live_arg {
        options = options.live_result_arg();
    }
    for raw in &opts.kwargs {
        let (name, value) = raw
            .split_once('=')
            .ok_or_else(|| format!("keyword argument '{raw}' is not name=value"))?;
        options = options.kwarg(name.trim(), parse_value(value));
    }
    Ok(options)
}

fn seed(opts: &Opts) -> Result<ResultMap, String> {
    match opts.seed.as_deref().map(|raw| serde_json::from_str::<Value>(raw)) {
        None => Ok(ResultMap::new()),
        Some(Ok(Value::Object(map))) => Ok(map),
        Some(Ok(other)) => Err(format!("seed must be a JSON object, got {other}")),
        Some(Err(err)) => Err(format!("seed is not valid JSON: {err}")),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let opts: Opts = Opts::parse();

    let log_level = if opts.debug {
        "debug"
    } else {
        opts.log_level.as_str()
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(get_log_level(log_level))
        .with_writer(std::io::stderr)
        .with_file(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let span = span!(Level::INFO, "flagpole");
    let _enter = span.enter();

    let (flags, registry) = demo::demo_registry()?;
    if opts.list {
        println!("{flags}");
        return Ok(());
    }

    let requested = flags.parse(&opts.flags)?;
    let options = build_options(&opts)?;
    let mut result = seed(&opts)?;

    let report = registry.build_out_into(requested, &mut result, &options)?;
    info!(
        "Requested {:?}, ran {:?} in {} pass(es)",
        flags.names_of(report.requested),
        report.producers,
        report.passes
    );

    println!("{}", serde_json::to_string_pretty(&Value::Object(result))?);
    Ok(())
}
