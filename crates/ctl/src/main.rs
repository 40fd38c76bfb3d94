//! Keel control binary.
//!
//! Builds the demo management model and lets you poke at it:
//! - resolve addresses and see which registration (or proxy) governs them
//! - describe registrations, optionally with their whole subtree
//! - invoke operations through the dispatcher

mod demo;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use keel_registry::{
	Caller, Dispatcher, ExtensionRegistry, OperationRequest, PathAddress, RegistryConfig, Resolution,
};
use serde_json::{Value, json};
use tracing::info;

/// Command line arguments.
#[derive(Parser, Debug)]
#[command(name = "keel-ctl")]
#[command(about = "Inspect and drive a keel management registry")]
struct Args {
	/// Registry config file (TOML)
	#[arg(short, long, value_name = "PATH")]
	config: Option<PathBuf>,

	/// Caller name used for access checks
	#[arg(long, default_value = "keel-ctl")]
	caller: String,

	/// Act with read permission only
	#[arg(long)]
	read_only: bool,

	/// Verbose logging
	#[arg(short, long)]
	verbose: bool,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Show which registration governs an address
	Resolve { address: PathAddress },
	/// Describe the registration governing an address
	Describe {
		#[arg(default_value = "/")]
		address: PathAddress,
		/// Include everything registered beneath
		#[arg(short, long)]
		recursive: bool,
	},
	/// List proxy controllers at or beneath an address
	Proxies {
		#[arg(default_value = "/")]
		address: PathAddress,
	},
	/// Invoke an operation
	Invoke {
		address: PathAddress,
		operation: String,
		/// Operation parameters as a JSON object
		#[arg(short, long, value_name = "JSON")]
		params: Option<String>,
	},
	/// List installed extensions and their subsystems
	Extensions,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	setup_tracing(args.verbose);

	let config = match &args.config {
		Some(path) => RegistryConfig::load(path)?,
		None => RegistryConfig::default(),
	};
	info!(caller = %args.caller, read_only = args.read_only, "starting keel-ctl");

	let admin = Caller::privileged(&args.caller);
	let extensions = demo::build(config, &admin)?;
	let caller = if args.read_only {
		Caller::reader(&args.caller)
	} else {
		admin
	};

	let output = run(&extensions, &caller, args.command)?;
	println!("{}", serde_json::to_string_pretty(&output)?);
	Ok(())
}

fn run(extensions: &ExtensionRegistry, caller: &Caller, command: Command) -> Result<Value, Box<dyn std::error::Error>> {
	let view = extensions.registry().read_view(caller);
	let output = match command {
		Command::Resolve { address } => match view.resolve(&address)? {
			Resolution::Registration(resolved) => json!({
				"address": address.to_string(),
				"registration": resolved.registration_address().to_string(),
				"override": resolved.override_name(),
				"runtime-only": resolved.is_runtime_only(),
			}),
			Resolution::Proxy(handoff) => json!({
				"address": address.to_string(),
				"proxy": handoff.proxy_address().to_string(),
				"remaining": handoff.remaining().to_string(),
			}),
			Resolution::NotFound => json!({ "address": address.to_string(), "not-found": true }),
		},
		Command::Describe { address, recursive } => {
			let description = if recursive {
				view.describe_recursive(&address)?
			} else {
				view.describe(&address)?
			};
			serde_json::to_value(description)?
		}
		Command::Proxies { address } => view
			.proxy_controllers(&address)?
			.iter()
			.map(|handoff| Value::String(handoff.proxy_address().to_string()))
			.collect(),
		Command::Invoke {
			address,
			operation,
			params,
		} => {
			let params = match params {
				Some(text) => serde_json::from_str(&text)?,
				None => Value::Null,
			};
			let request = OperationRequest::new(address, operation).with_params(params);
			Dispatcher::new(view).dispatch(&request)?
		}
		Command::Extensions => extensions
			.module_names()
			.into_iter()
			.map(|module| {
				let subsystems: Vec<Value> = extensions
					.subsystems(&module)
					.unwrap_or_default()
					.iter()
					.map(|info| json!({ "name": info.name, "version": info.version.to_string() }))
					.collect();
				json!({ "module": module, "subsystems": subsystems })
			})
			.collect(),
	};
	Ok(output)
}

fn setup_tracing(verbose: bool) {
	use tracing_subscriber::EnvFilter;
	use tracing_subscriber::prelude::*;

	let filter = EnvFilter::try_from_env("KEEL_LOG").unwrap_or_else(|_| {
		if verbose {
			EnvFilter::new("debug")
		} else {
			EnvFilter::new("info")
		}
	});

	tracing_subscriber::registry()
		.with(filter)
		.with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_target(true))
		.init();
}
