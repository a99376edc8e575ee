//! Command-line interface for EasyControls ventilation controllers.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{debug, info};
use ventlink_core::catalog::{self, Feature};
use ventlink_core::{Access, Converter, Value, VariableDescriptor, VentlinkConfig};
use ventlink_devices::{Coordinator, DeviceIdentity, Listener, VariableClient};

/// ventlink - query and control a ventilation controller over Modbus-TCP.
#[derive(Parser, Debug)]
#[command(name = "ventlink")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Action to perform.
    #[command(subcommand)]
    command: Command,

    /// Configuration file (TOML).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Host name or IP address of the controller.
    #[arg(long, global = true)]
    host: Option<String>,

    /// TCP port of the controller.
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Print machine-readable JSON.
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// List the known features.
    List,
    /// Read a feature.
    Get {
        /// Feature name, see `list`.
        feature: String,
    },
    /// Write a feature.
    Set {
        /// Feature name, see `list`.
        feature: String,
        /// New value.
        value: String,
    },
    /// Read a raw variable.
    Getvar {
        /// Variable name, e.g. v00104.
        name: String,
        /// Length of the value in bytes; taken from the catalog when omitted.
        size: Option<usize>,
    },
    /// Write a raw variable.
    Setvar {
        /// Variable name, e.g. v00102.
        name: String,
        /// Value string as sent to the device.
        value: String,
    },
    /// Show the device identity.
    Info,
    /// Poll features and print every update until interrupted.
    Watch {
        /// Features to watch; all when omitted.
        features: Vec<String>,
        /// Refresh interval in seconds.
        #[arg(short, long, default_value_t = 5)]
        interval: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    match &args.command {
        Command::List => list_features(args.json),
        Command::Get { feature } => get_feature(&args, feature).await,
        Command::Set { feature, value } => set_feature(&args, feature, value).await,
        Command::Getvar { name, size } => get_variable(&args, name, *size).await,
        Command::Setvar { name, value } => set_variable(&args, name, value).await,
        Command::Info => show_info(&args).await,
        Command::Watch { features, interval } => {
            watch(&args, features, Duration::from_secs((*interval).max(1))).await
        }
    }
}

fn init_logging(verbose: bool) {
    // JSON logs for containers and log shippers
    let json_logging = std::env::var("VENTLINK_LOG_JSON")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(false);

    let default_filter = if verbose { "ventlink=debug" } else { "ventlink=info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .compact()
            .init();
    }
}

/// Defaults, then file, then environment, then command-line flags.
fn load_config(args: &Args) -> Result<VentlinkConfig> {
    let mut config = VentlinkConfig::load(args.config.as_deref())?;
    if let Some(host) = &args.host {
        config.device.host = host.clone();
    }
    if let Some(port) = args.port {
        config.device.port = port;
    }
    config
        .validate()
        .context("Set the controller with --host, VENTLINK_HOST or a config file")?;
    Ok(config)
}

fn connect(args: &Args) -> Result<VariableClient> {
    let config = load_config(args)?;
    info!(address = %config.device.address(), "Using controller");
    Ok(VariableClient::from_config(&config.device))
}

fn lookup_feature(name: &str) -> Result<Feature> {
    catalog::feature(name).ok_or_else(|| anyhow!("Unknown feature '{}', see `ventlink list`", name))
}

fn list_features(json: bool) -> Result<()> {
    let features = catalog::features();

    if json {
        let listing: Vec<_> = features
            .iter()
            .map(|f| {
                json!({
                    "name": f.name,
                    "description": f.description,
                    "variable": f.variable.name(),
                    "size": f.variable.size(),
                    "writable": f.variable.is_writable(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    for f in &features {
        let access = if f.variable.is_writable() { "rw" } else { "ro" };
        println!("{:<30} {} {:<8} {}", f.name, access, f.variable.name(), f.description);
    }
    Ok(())
}

fn print_value(json: bool, name: &str, value: &Value) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(&json!({ "name": name, "value": value }))?);
    } else {
        println!("{}", value);
    }
    Ok(())
}

async fn get_feature(args: &Args, name: &str) -> Result<()> {
    let feature = lookup_feature(name)?;
    let client = connect(args)?;

    let value = client
        .get(&feature.variable)
        .await
        .ok_or_else(|| anyhow!("Failed to read feature '{}'", name))?;
    print_value(args.json, feature.name, &value)
}

async fn set_feature(args: &Args, name: &str, input: &str) -> Result<()> {
    let feature = lookup_feature(name)?;
    let variable = feature.variable.writable()?;
    let value = parse_value(feature.variable.converter(), input)?;
    let client = connect(args)?;

    if !client.set(&variable, &value).await {
        bail!("Failed to write feature '{}'", name);
    }
    Ok(())
}

async fn get_variable(args: &Args, name: &str, size: Option<usize>) -> Result<()> {
    let size = match size {
        Some(size) => size,
        None => catalog::by_name(name)
            .map(|v| v.size())
            .ok_or_else(|| anyhow!("Variable '{}' is not in the catalog, pass its size", name))?,
    };
    let variable = VariableDescriptor::try_new(name.to_string(), size, Converter::Text, Access::ReadOnly)?;
    let client = connect(args)?;

    let value = client
        .get(&variable)
        .await
        .ok_or_else(|| anyhow!("Failed to read variable '{}'", name))?;
    print_value(args.json, name, &value)
}

async fn set_variable(args: &Args, name: &str, value: &str) -> Result<()> {
    let variable =
        VariableDescriptor::try_new(name.to_string(), value.len().max(1), Converter::Text, Access::ReadWrite)?
            .writable()?;
    let client = connect(args)?;

    if !client.set(&variable, &Value::Text(value.to_string())).await {
        bail!("Failed to write variable '{}'", name);
    }
    Ok(())
}

async fn show_info(args: &Args) -> Result<()> {
    let client = connect(args)?;
    let identity = DeviceIdentity::read(&client).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&identity)?);
    } else {
        println!("Model:            {}", identity.model);
        println!("Serial number:    {}", identity.serial_number);
        println!("MAC address:      {}", identity.mac);
        println!("Firmware version: {}", identity.firmware_version);
        println!("Max air flow:     {} m³/h", identity.maximum_air_flow);
    }
    Ok(())
}

async fn watch(args: &Args, names: &[String], interval: Duration) -> Result<()> {
    let features = if names.is_empty() {
        catalog::features()
    } else {
        names.iter().map(|n| lookup_feature(n)).collect::<Result<Vec<_>>>()?
    };

    let mut config = load_config(args)?;
    config.polling.refresh_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
    let coordinator = Coordinator::connect(&config).await?;
    info!(
        model = %coordinator.model(),
        features = features.len(),
        "Watching controller"
    );

    for feature in features {
        coordinator.add_listener(&feature.variable, feature_printer(&feature, args.json));
        // The default poll set already covers most registers.
        if coordinator.schedule_poll(feature.variable.clone(), interval) {
            debug!(feature = feature.name, "Polling extra register");
        }
    }

    tokio::signal::ctrl_c().await?;
    coordinator.unload();
    Ok(())
}

/// Listener printing updates of one feature.
fn feature_printer(feature: &Feature, json: bool) -> Listener {
    let name = feature.name;

    Arc::new(move |_: &VariableDescriptor, value: Option<&Value>| {
        if json {
            println!("{}", json!({ "name": name, "value": value }));
        } else {
            match value {
                Some(value) => println!("{:<30} {}", name, value),
                None => println!("{:<30} unavailable", name),
            }
        }
    })
}

/// Parse command-line input for a converter.
fn parse_value(converter: Converter, input: &str) -> Result<Value> {
    let input = input.trim();
    let invalid = || anyhow!("'{}' is not a valid {} value", input, converter.kind());

    let value = match converter {
        Converter::Bool => match input.to_ascii_lowercase().as_str() {
            "1" | "true" | "on" | "yes" => Value::Bool(true),
            "0" | "false" | "off" | "no" => Value::Bool(false),
            _ => return Err(invalid()),
        },
        Converter::Int => Value::Int(input.parse().map_err(|_| invalid())?),
        Converter::Float | Converter::OperationHours => Value::Float(input.parse().map_err(|_| invalid())?),
        Converter::Text => Value::Text(input.to_string()),
        Converter::Flag(_) => return Err(invalid()),
    };
    Ok(value)
}
