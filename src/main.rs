//! CivicFlow CLI Entry Point
//!
//! Provides command-line interface for running workflows and appeals.
//!
//! # Usage
//!
//! ```bash
//! # Run a template with inputs
//! civicflow run eligibility_check --input citizen_id=CIT-00001 --input scheme_name=scheme_alpha
//!
//! # Keep state between invocations
//! civicflow run batch_eligibility --state state.json --input scheme_name=scheme_beta
//!
//! # Appeal a completed instance with new evidence
//! civicflow appeal <INSTANCE_ID> --state state.json --input income=40000
//!
//! # Inspect an instance
//! civicflow show <INSTANCE_ID> --state state.json
//! civicflow audit <INSTANCE_ID> --state state.json
//! civicflow report <INSTANCE_ID> --state state.json
//! ```

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use colored::*;
use log::{info, warn};
use serde_json::Value;

use civicflow::config::EngineConfig;
use civicflow::execution::Engine;
use civicflow::workflow::{Context, InstanceStatus, StepStatus};
use civicflow::{APP_NAME, VERSION};

/// Subcommand selected on the command line.
#[derive(Debug, Clone, PartialEq)]
enum Command {
    Run(String),
    Appeal(String),
    Show(String),
    Audit(String),
    Report(String),
}

/// Command-line configuration parsed from arguments.
#[derive(Debug)]
struct Config {
    command: Option<Command>,
    inputs: Context,
    config_path: Option<PathBuf>,
    templates_dir: Option<PathBuf>,
    state_file: Option<PathBuf>,
    max_workers: Option<usize>,
    verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            command: None,
            inputs: Context::new(),
            config_path: None,
            templates_dir: None,
            state_file: None,
            max_workers: None,
            verbose: false,
        }
    }
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

/// Prints the application banner with version information.
fn print_banner() {
    println!();
    println!("{} v{}", APP_NAME.bold(), VERSION);
    println!("Eligibility Workflow Engine");
    println!();
}

/// Prints usage information.
fn print_usage() {
    println!("Usage: civicflow <COMMAND> <ID> [OPTIONS]");
    println!();
    println!("Commands:");
    println!("  run <TEMPLATE_ID>      Run a workflow template");
    println!("  appeal <INSTANCE_ID>   Appeal a completed instance (evidence via --input)");
    println!("  show <INSTANCE_ID>     Show an instance");
    println!("  audit <INSTANCE_ID>    Show the audit trail of an instance");
    println!("  report <INSTANCE_ID>   Show the report of a completed instance");
    println!();
    println!("Options:");
    println!("  --input KEY=VALUE      Add an input (VALUE is parsed as JSON, else a string)");
    println!("  --templates DIR        Template directory (default: templates)");
    println!("  --state FILE           Persist state to a JSON file");
    println!("  --config FILE          Load engine configuration from a YAML file");
    println!("  --workers N            Default batch worker bound (default: 20)");
    println!("  --verbose              Enable debug logging");
    println!("  --help                 Show this help message");
    println!("  --version              Show version information");
    println!();
    println!("Examples:");
    println!(
        "  civicflow run eligibility_check --input citizen_id=CIT-00001 --input scheme_name=scheme_alpha"
    );
    println!("  civicflow appeal 6f1c... --state state.json --input income=40000");
}

/// Splits `KEY=VALUE`; the value is JSON if it parses, a string otherwise.
fn parse_input(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("Input must look like KEY=VALUE: {}", raw))?;

    let key = key.trim();
    if key.is_empty() {
        return Err(format!("Input key is empty: {}", raw));
    }

    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

/// Returns the argument following a flag.
fn value_of<'a>(args: &'a [String], i: usize, flag: &str) -> Result<&'a String, String> {
    args.get(i)
        .ok_or_else(|| format!("{} requires an argument", flag))
}

/// Parses command-line arguments into a Config struct.
fn parse_arguments(args: &[String]) -> Result<Config, String> {
    let mut config = Config::default();
    let mut positional: Vec<&String> = Vec::new();
    let mut i = 1; // Skip program name

    while i < args.len() {
        let arg = &args[i];

        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("{} {}", APP_NAME, VERSION);
                std::process::exit(0);
            }
            "--verbose" | "-v" => {
                config.verbose = true;
            }
            "--input" | "-i" => {
                i += 1;
                let (key, value) = parse_input(value_of(args, i, "--input")?)?;
                config.inputs.insert(key, value);
            }
            "--templates" => {
                i += 1;
                config.templates_dir = Some(PathBuf::from(value_of(args, i, "--templates")?));
            }
            "--state" => {
                i += 1;
                config.state_file = Some(PathBuf::from(value_of(args, i, "--state")?));
            }
            "--config" => {
                i += 1;
                config.config_path = Some(PathBuf::from(value_of(args, i, "--config")?));
            }
            "--workers" => {
                i += 1;
                let raw = value_of(args, i, "--workers")?;
                config.max_workers = Some(
                    raw.parse()
                        .map_err(|_| format!("Invalid workers value: {}", raw))?,
                );
            }
            arg if arg.starts_with('-') => {
                return Err(format!("Unknown option: {}", arg));
            }
            _ => positional.push(arg),
        }
        i += 1;
    }

    config.command = match positional.as_slice() {
        [] => None,
        [command, id] => Some(match command.as_str() {
            "run" => Command::Run(id.to_string()),
            "appeal" => Command::Appeal(id.to_string()),
            "show" => Command::Show(id.to_string()),
            "audit" => Command::Audit(id.to_string()),
            "report" => Command::Report(id.to_string()),
            other => return Err(format!("Unknown command: {}", other)),
        }),
        [command] => return Err(format!("{} requires an id argument", command)),
        [_, _, extra, ..] => return Err(format!("Unexpected argument: {}", extra)),
    };

    Ok(config)
}

/// Builds the engine configuration: file first, then command-line overrides.
fn engine_config(config: &Config) -> Result<EngineConfig, Box<dyn std::error::Error>> {
    let mut engine_config = match &config.config_path {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    if let Some(dir) = &config.templates_dir {
        engine_config.templates_dir = dir.clone();
    }
    if let Some(path) = &config.state_file {
        engine_config.state_file = Some(path.clone());
    }
    if let Some(workers) = config.max_workers {
        engine_config.max_workers = workers;
    }

    Ok(engine_config)
}

fn colored_status(status: InstanceStatus) -> ColoredString {
    match status {
        InstanceStatus::Completed => status.as_str().green(),
        InstanceStatus::Failed => status.as_str().red(),
        InstanceStatus::Running => status.as_str().yellow(),
    }
}

fn pretty(value: &impl serde::Serialize) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(value)
}

/// Prints status and outputs of an instance.
fn print_instance(engine: &Engine, instance_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let instance = engine.instance(instance_id)?;

    println!();
    println!("{} {}", "Instance:".bold(), instance.instance_id);
    println!("{} {}", "Template:".bold(), instance.template_id);
    println!("{} {}", "Status:".bold(), colored_status(instance.status));
    println!("{} {}", "Triggered:".bold(), instance.triggered_at.to_rfc3339());
    if let Some(completed_at) = instance.completed_at {
        println!("{} {}", "Completed:".bold(), completed_at.to_rfc3339());
    }
    if let Some(outputs) = &instance.outputs {
        println!("{}", "Outputs:".bold());
        println!("{}", pretty(outputs)?);
    }
    Ok(())
}

/// Prints the audit trail of an instance, one line per step attempt.
fn print_audit(engine: &Engine, instance_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let trail = engine.audit_trail(instance_id)?;

    println!();
    println!("{} ({} records)", "Audit trail".bold(), trail.len());
    for record in &trail {
        let elapsed = record.completed_at - record.started_at;
        match record.status {
            StepStatus::Success => println!(
                "  {} #{} {} ({} ms)",
                "✓".green(),
                record.sequence,
                record.step_name,
                elapsed.num_milliseconds()
            ),
            StepStatus::Failed => println!(
                "  {} #{} {}: {}",
                "✗".red(),
                record.sequence,
                record.step_name,
                record.error_message.as_deref().unwrap_or("unknown error")
            ),
        }
    }
    Ok(())
}

/// Main application entry point.
fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    // Parse arguments
    let config = parse_arguments(&args).map_err(|e| {
        eprintln!("Error: {}", e);
        eprintln!();
        print_usage();
        e
    })?;

    let Some(command) = config.command.clone() else {
        print_usage();
        return Ok(());
    };

    setup_logging(config.verbose);
    print_banner();

    let engine_config = engine_config(&config)?;
    if engine_config.state_file.is_none() && !matches!(command, Command::Run(_)) {
        warn!("No --state file given; only instances from this process are visible");
    }

    info!("Templates: {}", engine_config.templates_dir.display());
    let engine = Engine::from_config(&engine_config)?;

    match command {
        Command::Run(template_id) => {
            let instance_id = engine.execute(&template_id, config.inputs)?;
            print_instance(&engine, &instance_id)?;
            print_audit(&engine, &instance_id)?;
        }
        Command::Appeal(original_id) => {
            let receipt = engine.submit_appeal(&original_id, config.inputs)?;
            print_instance(&engine, &receipt.new_instance_id)?;
            print_audit(&engine, &receipt.new_instance_id)?;
            println!();
            println!("{} {}", "Appeal outcome:".bold(), receipt.outcome);
        }
        Command::Show(instance_id) => print_instance(&engine, &instance_id)?,
        Command::Audit(instance_id) => print_audit(&engine, &instance_id)?,
        Command::Report(instance_id) => {
            let report = engine.report(&instance_id)?;
            println!("{}", pretty(&report)?);
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("{} {}", "Error:".red(), e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("civicflow")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_parse_run_with_inputs() {
        let config = parse_arguments(&args(&[
            "run",
            "eligibility_check",
            "--input",
            "citizen_id=CIT-00001",
            "--input",
            "age=30",
            "--workers",
            "4",
        ]))
        .unwrap();

        assert_eq!(config.command, Some(Command::Run("eligibility_check".to_string())));
        assert_eq!(config.inputs["citizen_id"], json!("CIT-00001"));
        assert_eq!(config.inputs["age"], json!(30));
        assert_eq!(config.max_workers, Some(4));
    }

    #[test]
    fn test_parse_input_values() {
        assert_eq!(parse_input("income=40000").unwrap(), ("income".to_string(), json!(40000)));
        assert_eq!(parse_input("ids=[\"a\",\"b\"]").unwrap().1, json!(["a", "b"]));
        assert_eq!(parse_input("note=a=b").unwrap().1, json!("a=b"));
        assert!(parse_input("novalue").is_err());
        assert!(parse_input("=1").is_err());
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_arguments(&args(&["run"])).is_err());
        assert!(parse_arguments(&args(&["launch", "x"])).is_err());
        assert!(parse_arguments(&args(&["run", "x", "y"])).is_err());
        assert!(parse_arguments(&args(&["run", "x", "--bogus"])).is_err());
        assert!(parse_arguments(&args(&["run", "x", "--workers", "many"])).is_err());
        assert!(parse_arguments(&args(&["run", "x", "--state"])).is_err());
    }

    #[test]
    fn test_no_command() {
        let config = parse_arguments(&args(&[])).unwrap();
        assert!(config.command.is_none());
    }

    #[test]
    fn test_engine_config_overrides() {
        let config = parse_arguments(&args(&[
            "show",
            "abc",
            "--templates",
            "/tmp/t",
            "--state",
            "s.json",
        ]))
        .unwrap();

        let engine_config = engine_config(&config).unwrap();
        assert_eq!(engine_config.templates_dir, PathBuf::from("/tmp/t"));
        assert_eq!(engine_config.state_file, Some(PathBuf::from("s.json")));
        assert_eq!(engine_config.max_workers, 20);
    }
}
