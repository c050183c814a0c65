//! kfuse - fuse chains of elementwise kernels into single dispatches
//!
//! # Usage
//!
//! ```bash
//! # Write the sample kernel bundle
//! kfuse sample -o kernels.json
//!
//! # List the kernels and invokables a bundle exports
//! kfuse inspect kernels.json
//!
//! # Fuse image:0 -> image:1 -> image:2 into one kernel and print its IR
//! kfuse fuse kernels.json --stage image:0 --stage image:1 --stage image:2 --name pipeline
//!
//! # Re-export an invokable as a group-level entry point
//! kfuse wrap kernels.json --invoke image:0 --name setup_group
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use compiler::bundle::{BundleFormat, KernelBundle};
use compiler::config::FusionConfig;
use compiler::fusion::{FusionChain, Fuser, InvokeRef, KernelRef};
use compiler::ir::dump::dump_module;
use compiler::ir::validation::validate_module;
use compiler::ir::IrModule;
use compiler::metadata::MetadataExtractor;
use compiler::{logging, samples};
use std::path::{Path, PathBuf};
use std::process;

#[derive(Parser)]
#[command(name = "kfuse")]
#[command(version = "0.1.0")]
#[command(about = "Fuse chains of elementwise compute kernels", long_about = None)]
struct Cli {
    /// Log planning and commit steps
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the built-in sample kernel bundle
    Sample {
        /// Output file (JSON on stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long, value_enum, default_value = "json")]
        format: BundleOutput,
    },

    /// Print the export tables of every module in a bundle
    Inspect {
        bundle: PathBuf,
    },

    /// Fuse a chain of kernels into one
    Fuse {
        bundle: PathBuf,

        /// Chain stage as module:slot, in execution order
        #[arg(long = "stage", required = true, value_parser = parse_slot)]
        stages: Vec<SlotArg>,

        /// Name of the fused kernel
        #[arg(long)]
        name: String,

        #[command(flatten)]
        emit: EmitArgs,
    },

    /// Wrap an invokable function under a new name
    Wrap {
        bundle: PathBuf,

        /// Invokable as module:slot
        #[arg(long, value_parser = parse_slot)]
        invoke: SlotArg,

        /// Name of the wrapper
        #[arg(long)]
        name: String,

        #[command(flatten)]
        emit: EmitArgs,
    },
}

#[derive(clap::Args)]
struct EmitArgs {
    /// Fusion config (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Name of the linked destination module
    #[arg(long, default_value = "fused")]
    module: String,

    /// Output file (stdout if omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "ir")]
    format: OutputFormat,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum BundleOutput {
    Json,
    Postcard,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OutputFormat {
    /// Text dump of the destination module
    Ir,
    Json,
    Postcard,
}

impl From<BundleOutput> for BundleFormat {
    fn from(format: BundleOutput) -> Self {
        match format {
            BundleOutput::Json => BundleFormat::Json,
            BundleOutput::Postcard => BundleFormat::Postcard,
        }
    }
}

#[derive(Clone, Debug)]
struct SlotArg {
    module: String,
    slot: usize,
}

fn parse_slot(arg: &str) -> Result<SlotArg, String> {
    let (module, slot) = arg
        .rsplit_once(':')
        .ok_or_else(|| format!("expected module:slot, got '{}'", arg))?;
    let slot = slot
        .parse()
        .map_err(|e| format!("invalid slot '{}': {}", slot, e))?;
    Ok(SlotArg {
        module: module.to_string(),
        slot,
    })
}

fn main() {
    let cli = Cli::parse();
    if cli.verbose {
        logging::init_with_level(log::LevelFilter::Debug);
    } else {
        logging::init_from_env();
    }

    let result = match cli.command {
        Commands::Sample { output, format } => write_samples(output, format),
        Commands::Inspect { bundle } => inspect(bundle),
        Commands::Fuse {
            bundle,
            stages,
            name,
            emit,
        } => fuse(bundle, stages, name, emit),
        Commands::Wrap {
            bundle,
            invoke,
            name,
            emit,
        } => wrap(bundle, invoke, name, emit),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn write_samples(output: Option<PathBuf>, format: BundleOutput) -> Result<(), String> {
    let bundle = samples::sample_bundle().ok_or("failed to build sample kernels")?;
    match output {
        Some(path) => {
            bundle
                .save(&path, format.into())
                .map_err(|e| format!("Failed to write {}: {}", path.display(), e))?;
            println!("Wrote {} modules to {}", bundle.modules.len(), path.display());
        }
        None => println!("{}", bundle.to_json().map_err(|e| e.to_string())?),
    }
    Ok(())
}

fn load_bundle(path: &Path) -> Result<KernelBundle, String> {
    KernelBundle::load(path).map_err(|e| format!("Failed to load {}: {}", path.display(), e))
}

fn inspect(path: PathBuf) -> Result<(), String> {
    let bundle = load_bundle(&path)?;
    for module in &bundle.modules {
        let mut metadata = MetadataExtractor::new(module);
        metadata.extract().map_err(|e| e.to_string())?;

        println!("module {}", module.name);
        let slots = metadata
            .export_foreach_names()
            .iter()
            .zip(metadata.export_foreach_signatures())
            .zip(metadata.export_foreach_input_counts());
        for (slot, ((name, signature), inputs)) in slots.enumerate() {
            let name = if name.is_empty() { "<unused>" } else { name };
            println!(
                "  foreach[{}] {} signature={} inputs={}",
                slot, name, signature, inputs
            );
        }
        for (slot, name) in metadata.export_func_names().iter().enumerate() {
            println!("  invoke[{}] {}", slot, name);
        }
    }
    Ok(())
}

fn find_module<'b>(bundle: &'b KernelBundle, name: &str) -> Result<&'b IrModule, String> {
    bundle
        .module(name)
        .ok_or_else(|| format!("No module named '{}' in bundle", name))
}

fn load_config(path: Option<&Path>) -> Result<FusionConfig, String> {
    match path {
        Some(path) => FusionConfig::load(path).map_err(|e| e.to_string()),
        None => Ok(FusionConfig::default()),
    }
}

fn fuse(path: PathBuf, stages: Vec<SlotArg>, name: String, emit: EmitArgs) -> Result<(), String> {
    let config = load_config(emit.config.as_deref())?;
    let bundle = load_bundle(&path)?;

    let mut refs = Vec::with_capacity(stages.len());
    for stage in &stages {
        refs.push(KernelRef::new(find_module(&bundle, &stage.module)?, stage.slot));
    }
    let chain = FusionChain::new(refs).map_err(|e| e.to_string())?;

    let mut dest = bundle.link(&emit.module).map_err(|e| e.to_string())?;
    let fused = Fuser::new(&config)
        .fuse(&chain, &name, &mut dest)
        .map_err(|e| format!("Fusion failed: {}", e))?;
    eprintln!(
        "Fused {} kernels into '{}' (signature {})",
        fused.stages, fused.name, fused.signature
    );

    emit_module(dest, &config, &emit)
}

fn wrap(path: PathBuf, invoke: SlotArg, name: String, emit: EmitArgs) -> Result<(), String> {
    let config = load_config(emit.config.as_deref())?;
    let bundle = load_bundle(&path)?;
    let target = InvokeRef::new(find_module(&bundle, &invoke.module)?, invoke.slot);

    let mut dest = bundle.link(&emit.module).map_err(|e| e.to_string())?;
    let id = Fuser::new(&config)
        .wrap_invoke(&target, &name, &mut dest)
        .map_err(|e| format!("Wrapping failed: {}", e))?;
    eprintln!("Wrapped invokable as '{}' ({})", name, id);

    emit_module(dest, &config, &emit)
}

fn emit_module(dest: IrModule, config: &FusionConfig, emit: &EmitArgs) -> Result<(), String> {
    if config.verify {
        validate_module(&dest).map_err(|errors| {
            let lines: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            format!("Invalid output module:\n  {}", lines.join("\n  "))
        })?;
    }

    let bytes = match emit.format {
        OutputFormat::Ir => dump_module(&dest).into_bytes(),
        OutputFormat::Json => KernelBundle::new(vec![dest])
            .encode(BundleFormat::Json)
            .map_err(|e| e.to_string())?,
        OutputFormat::Postcard => KernelBundle::new(vec![dest])
            .encode(BundleFormat::Postcard)
            .map_err(|e| e.to_string())?,
    };

    match &emit.output {
        Some(path) => std::fs::write(path, bytes)
            .map_err(|e| format!("Failed to write {}: {}", path.display(), e)),
        None => {
            use std::io::Write;
            std::io::stdout()
                .write_all(&bytes)
                .map_err(|e| e.to_string())
        }
    }
}
