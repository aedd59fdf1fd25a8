//! Command-line surface (§6): three verbs (`arm`, `bicep`, `terraform`)
//! sharing one set of persistent flags, with configuration precedence
//! flag > environment > config file > built-in default.
//!
//! Grounded on the teacher's `src/elevate.rs` (`ElevateConfig`, a
//! `clap::Parser` struct mixing required and optional flags) and
//! `src/models/scope.rs::ScopeBuilder` (nested `clap::Args` structs), and
//! on `original_source/cmd/rootCmd.go`'s `initializeConfig`/`bindFlags`
//! viper precedence chain: a config file's scalar keys are loaded into
//! `MPF_*` environment variables before `clap` parses, so `clap`'s own
//! `env = "MPF_..."` fields keep their normal flag-over-env precedence
//! and the file only ever supplies a value nothing else set.

use crate::{logging::Verbosity, models::config::ServicePrincipal};
use anyhow::{Context, Result};
use clap::{Args, Command as ClapCommand, CommandFactory, Parser, Subcommand};
use std::{cmp::min, path::PathBuf};

#[derive(Parser)]
#[command(name = "az-mpf", about = "Discover the minimum Azure RBAC permissions an IaC deployment needs")]
pub struct Cli {
    #[command(flatten)]
    pub verbosity: Verbosity,

    #[command(flatten)]
    pub common: CommonArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Clone)]
pub struct CommonArgs {
    /// Subscription the deployment runs against
    #[arg(long, env = "MPF_SUBSCRIPTION_ID")]
    pub subscription_id: String,

    #[command(flatten)]
    pub sp: ServicePrincipal,

    /// Resource group name prefix; a random suffix is appended
    #[arg(long, default_value = "az-mpf")]
    pub resource_group_name_pfx: String,

    /// Deployment name prefix; a random suffix is appended
    #[arg(long, default_value = "az-mpf")]
    pub deployment_name_pfx: String,

    /// Azure region used when a resource group must be created
    #[arg(long)]
    pub location: Option<String>,

    /// Maximum number of ATTEMPT iterations before giving up
    #[arg(long, default_value_t = 50)]
    pub max_iterations: u32,

    /// Print the discovered permissions grouped by scope as well as the merged total
    #[arg(long, conflicts_with = "json_output")]
    pub show_detailed_output: bool,

    /// Print the discovered permissions as JSON instead of text
    #[arg(long)]
    pub json_output: bool,

    /// Path to a config file (TOML) providing defaults for any flag above
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Deploy an ARM JSON template
    Arm(ArmArgs),
    /// Evaluate an ARM JSON template with What-If instead of deploying it
    ArmWhatIf(ArmArgs),
    /// Compile a Bicep file to ARM and deploy it
    Bicep(BicepArgs),
    /// Apply (then destroy) a Terraform configuration
    Terraform(TerraformArgs),
    /// Render the full `--help` tree as Markdown, for keeping README.md in sync
    #[command(hide = true)]
    Readme,
}

#[derive(Args)]
pub struct ArmArgs {
    /// Path to the ARM template JSON file
    #[arg(long)]
    pub template_file_path: PathBuf,
    /// Path to the ARM parameters JSON file
    #[arg(long)]
    pub parameters_file_path: Option<PathBuf>,
    /// The template deploys at the subscription scope rather than into a
    /// created resource group
    #[arg(long)]
    pub subscription_scoped: bool,
}

#[derive(Args)]
pub struct BicepArgs {
    /// Path to the Bicep file
    #[arg(long)]
    pub bicep_file_path: PathBuf,
    /// Path to the parameters JSON file
    #[arg(long)]
    pub parameters_file_path: Option<PathBuf>,
    /// Path to the Bicep compiler executable
    #[arg(long, default_value = "bicep")]
    pub bicep_exec_path: PathBuf,
    /// The template deploys at the subscription scope rather than into a
    /// created resource group
    #[arg(long)]
    pub subscription_scoped: bool,
}

#[derive(Args)]
pub struct TerraformArgs {
    /// Directory containing the Terraform configuration
    #[arg(long)]
    pub working_dir: PathBuf,
    /// Path to the `terraform` executable
    #[arg(long, default_value = "terraform")]
    pub tf_path: PathBuf,
    /// Path to a `.tfvars` file
    #[arg(long)]
    pub var_file_path: Option<PathBuf>,
    /// Narrow apply/destroy to a single module address (`-target=module.x`)
    #[arg(long)]
    pub target_module: Option<String>,
    /// Run `terraform import` for resources Terraform reports as already existing
    #[arg(long)]
    pub import_existing_resources_to_state: bool,
}

/// Renders `cmd`'s full `--help` tree as a Markdown document, recursing
/// into subcommands up to 6 levels deep (crates.io/GitHub's own render
/// depth). Grounded on the teacher's `src/bin/az-pim.rs::build_readme`.
fn build_readme(cmd: &mut ClapCommand, mut names: Vec<String>) -> String {
    let mut readme = String::new();
    names.push(cmd.get_name().to_owned());

    for positional in cmd.get_positionals() {
        names.push(format!("<{}>", positional.get_id().as_str().to_uppercase()));
    }

    let name = names.join(" ");
    let heading_level = min(names.iter().filter(|f| !f.starts_with('<')).count(), 6);
    readme.push_str(&"#".repeat(heading_level));
    readme.push_str(&format!(" {name}\n\n```\n{}\n```\n", cmd.render_long_help()));

    for sub in cmd.get_subcommands_mut() {
        if sub.get_name() == "readme" {
            continue;
        }
        readme.push_str(&build_readme(sub, names.clone()));
    }
    readme
}

/// Renders the full CLI help tree as Markdown, the way `README.md`'s
/// usage section is kept in sync with `clap`'s derived help text.
#[must_use]
pub fn render_readme() -> String {
    let mut cmd = Cli::command();
    build_readme(&mut cmd, Vec::new())
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .replace("\n\n\n", "\n")
}

/// Builds the effective `Cli`, layering (lowest to highest precedence):
/// built-in `clap` defaults, an optional `az-mpf.toml` config file, then
/// `MPF_`-prefixed environment variables, then explicit CLI flags.
///
/// `clap` already owns the "flag wins over env" precedence for fields
/// marked `env = "MPF_..."`; the config-file layer here only needs to
/// sit below that, which it achieves by being consulted solely to fill
/// in `std::env::set_var` values for keys the operator didn't already
/// set, before `clap::Parser::parse` runs.
///
/// # Errors
/// Will return `Err` if a config file is named but cannot be parsed.
pub fn load() -> Result<Cli> {
    let config_path = std::env::args()
        .collect::<Vec<_>>()
        .windows(2)
        .find(|w| w[0] == "--config")
        .map(|w| PathBuf::from(&w[1]))
        .or_else(|| {
            let default = PathBuf::from("az-mpf.toml");
            default.exists().then_some(default)
        });

    if let Some(path) = config_path {
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let table: toml::value::Table = toml::from_str(&contents)
            .with_context(|| format!("parsing config file {}", path.display()))?;

        for (key, value) in table {
            let Some(value) = scalar_to_string(&value) else {
                continue;
            };
            let env_key = format!("MPF_{}", key.to_uppercase().replace('-', "_"));
            if std::env::var(&env_key).is_err() {
                std::env::set_var(env_key, value);
            }
        }
    }

    Ok(Cli::parse())
}

/// Flattens a scalar TOML value into the string `std::env::set_var`
/// wants; nested tables/arrays are not supported by this flat key/env
/// mapping and are skipped.
fn scalar_to_string(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Integer(i) => Some(i.to_string()),
        toml::Value::Float(f) => Some(f.to_string()),
        toml::Value::Boolean(b) => Some(b.to_string()),
        toml::Value::Datetime(d) => Some(d.to_string()),
        toml::Value::Array(_) | toml::Value::Table(_) => None,
    }
}
