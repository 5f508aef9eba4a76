mod assembly;
mod asset;
mod config;
mod expr;
mod models;
mod region;
mod stack;
mod table_cell;
mod template;
mod user_data;

use anyhow::Context;
use log::{debug, error, info};
use std::io::{self, Write};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::{env, fs, process};
use structopt::StructOpt;
use tabwriter::TabWriter;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use asset::BootstrapScript;
use config::{Overrides, Settings};
use stack::SynthContext;
use table_cell::ToTableCell;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid configuration for stack {stack:?}: {source}")]
    Configuration { stack: String, #[source] source: Box<Error> },

    #[error("Unsupported region {region:?}")]
    UnsupportedRegion { region: String },

    #[error("No machine image for region {region} (got {image_id:?})")]
    UnresolvedImage { region: String, image_id: String },

    #[error("Invalid stack name {stack:?}")]
    InvalidStackName { stack: String },

    #[error("Stack {stack:?} is listed more than once")]
    DuplicateStack { stack: String },

    #[error("Stacks {first:?} and {second:?} both claim the name {name:?}")]
    NameCollision { name: String, first: String, second: String },

    #[error("{failed} of {total} stack(s) could not be synthesized")]
    SynthesisFailed { failed: usize, total: usize },

    #[error("Unknown stack {stack:?}")]
    UnknownStack { stack: String },

    #[error("Output {label:?} has no value until the stack is deployed")]
    Unresolved { label: String },

    #[error("Unable to read configuration from {}: {source}", path.display())]
    ReadConfiguration { path: PathBuf, source: io::Error },

    #[error("Unable to parse configuration in {}: {source}", path.display())]
    ParseConfiguration { path: PathBuf, source: toml::de::Error },

    #[error("Unable to load environment from {}: {source}", path.display())]
    Dotenv { path: PathBuf, source: dotenv::Error },

    #[error("I/O error on {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether the error comes from bad input rather than from the system
    pub fn is_configuration(&self) -> bool {
        match self {
            Error::Configuration { .. }
            | Error::UnsupportedRegion { .. }
            | Error::UnresolvedImage { .. }
            | Error::InvalidStackName { .. }
            | Error::DuplicateStack { .. }
            | Error::NameCollision { .. }
            | Error::SynthesisFailed { .. }
            | Error::ReadConfiguration { .. }
            | Error::ParseConfiguration { .. } => true,
            _ => false,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

fn import_env() -> Result<()> {
    let path = match dirs::config_dir() {
        Some(dir) => dir.join("ipsec-vpn-stack").join("env"),
        None => return Ok(()),
    };
    if !path.exists() {
        return Ok(());
    }
    dotenv::from_path(&path).map_err(|source| Error::Dotenv { path, source })
}

fn read_bootstrap(path: &Path) -> Result<BootstrapScript> {
    let bytes = fs::read(path).map_err(|source| Error::Io { path: path.to_path_buf(), source })?;
    let script = BootstrapScript::from_bytes(bytes);
    debug!("Read bootstrap script {} ({} bytes, sha256 {})", path.display(), script.bytes().len(), script.digest());
    Ok(script)
}

fn synth_context(settings: &Settings) -> Result<SynthContext> {
    Ok(SynthContext {
        profile: settings.profile.clone(),
        qualifier: settings.qualifier.clone(),
        bootstrap: read_bootstrap(&settings.bootstrap)?,
    })
}

fn list_environments(settings: &Settings) -> anyhow::Result<()> {
    let mut tw = TabWriter::new(io::stdout());
    writeln!(tw, "STACK\tREGION\tIMAGE\tSTATUS")?;
    for env in &settings.environments {
        // The stack name is already in the first column
        let status = stack::validate(env).map_err(|err| match err {
            Error::Configuration { source, .. } => *source,
            err => err,
        });
        let image = Some(env.image_id.as_str()).filter(|id| !id.is_empty());
        writeln!(tw, "{}\t{}\t{}\t{}",
            env.stack_name.to_cell(), env.region.to_cell(), image.to_cell(), status.to_cell())?;
    }
    tw.flush()?;
    Ok(())
}

fn synth(settings: &Settings, out: &Path, stacks: &[String]) -> anyhow::Result<()> {
    let ctx = synth_context(settings)?;
    let selected = settings.select(stacks)?;

    // Environments share nothing, so a configuration error only drops its own stack
    let mut graphs = vec![];
    let mut failed = 0;
    for env in &selected {
        match stack::build_stack(&ctx, env) {
            Ok(graph) => {
                info!("Synthesized {} for {}", graph.stack_name, graph.region);
                graphs.push(graph);
            },
            Err(err) if err.is_configuration() => {
                error!("{}", err);
                failed += 1;
            },
            Err(err) => return Err(err.into()),
        }
    }
    let (graphs, collisions) = stack::split_disjoint(graphs);
    for err in &collisions {
        error!("{}", err);
    }
    failed += collisions.len();

    let manifest = assembly::write_assembly(out, &ctx.bootstrap, &graphs)
        .with_context(|| format!("writing cloud assembly to {}", out.display()))?;
    println!("{} stack(s) written to {}", manifest.stacks.len(), out.display());
    let uploads = assembly::upload_commands(out, &manifest, &settings.profile);
    if !uploads.is_empty() {
        println!("Upload the bootstrap script before deploying (ACCOUNT_ID is the target account):");
        for command in uploads {
            println!("  {}", command);
        }
    }
    if failed > 0 {
        return Err(Error::SynthesisFailed { failed, total: selected.len() }.into());
    }
    Ok(())
}

fn operator_outputs(settings: &Settings, stack_name: &str, public_ip: IpAddr, key_pair_id: &str) -> anyhow::Result<Vec<(String, String)>> {
    // No output depends on the script, so it is not read
    let ctx = SynthContext {
        profile: settings.profile.clone(),
        qualifier: settings.qualifier.clone(),
        bootstrap: BootstrapScript::from_bytes(vec![]),
    };
    let env = settings.find(stack_name)?;
    let graph = stack::build_stack(&ctx, env)?;
    let attrs = stack::realized_attributes(graph.region, public_ip, key_pair_id);
    Ok(stack::resolve_outputs(&graph, &attrs)?)
}

fn print_outputs(settings: &Settings, stack_name: &str, public_ip: IpAddr, key_pair_id: &str) -> anyhow::Result<()> {
    let mut tw = TabWriter::new(io::stdout());
    for (label, value) in operator_outputs(settings, stack_name, public_ip, key_pair_id)? {
        writeln!(tw, "{}:\t{}", label, value)?;
    }
    tw.flush()?;
    Ok(())
}

#[derive(StructOpt, Debug)]
#[structopt(name = "ipsec-vpn-stack")]
/// per-region CloudFormation stacks for a personal IPsec VPN server
struct Opt {
    /// Environments file (TOML)
    ///
    /// If one is not provided, the built-in list of stacks is used.
    #[structopt(long, global = true, parse(from_os_str))]
    environments: Option<PathBuf>,

    /// Credential profile used by the key download command
    #[structopt(long, global = true)]
    profile: Option<String>,

    /// Script run on the instance at first boot
    #[structopt(long, global = true, parse(from_os_str))]
    bootstrap: Option<PathBuf>,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(StructOpt, Debug)]
enum Command {
    #[structopt(name = "ls")]
    /// List environments and whether they can be synthesized
    List,
    #[structopt(name = "synth")]
    /// Write CloudFormation templates and the bootstrap asset
    Synth {
        /// Output directory
        #[structopt(long, default_value = "cdk.out", parse(from_os_str))]
        out: PathBuf,

        /// Stacks to synthesize (default: all)
        #[structopt(name = "STACK")]
        stacks: Vec<String>,
    },
    #[structopt(name = "outputs")]
    /// Print the operator commands for a deployed stack
    Outputs {
        /// Stack name
        #[structopt(name = "STACK")]
        stack: String,

        /// Public IP address of the deployed instance
        #[structopt(long)]
        ip: IpAddr,

        /// Id the provider assigned to the key pair (key-...)
        #[structopt(long)]
        key_pair_id: String,
    },
}

fn run() -> anyhow::Result<()> {
    import_env()?;
    env_logger::init();

    let opt = Opt::from_args();
    let overrides = Overrides {
        environments: opt.environments,
        profile: opt.profile,
        bootstrap: opt.bootstrap,
    };
    let settings = Settings::resolve(overrides, |name| env::var(name).ok())?;

    match opt.cmd {
        Command::List => {
            list_environments(&settings)?;
        },
        Command::Synth { out, stacks } => {
            synth(&settings, &out, &stacks)?;
        },
        Command::Outputs { stack, ip, key_pair_id } => {
            print_outputs(&settings, &stack, ip, &key_pair_id)?;
        },
    }
    Ok(())
}

fn main() {
    if let Err(err) = run() {
        let mut stderr = StandardStream::stderr(ColorChoice::Auto);
        let _ = stderr.set_color(ColorSpec::new().set_fg(Some(Color::Red)).set_bold(true));
        let _ = write!(stderr, "An error occurred:");
        let _ = stderr.reset();
        let _ = writeln!(stderr, "\n{:#}", err);
        process::exit(exit_code(&err));
    }
}

/// 2 for bad input, 1 for everything else
fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<Error>() {
        Some(err) if err.is_configuration() => 2,
        _ => 1,
    }
}
