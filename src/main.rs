//! # makegen CLI Entry Point
//!
//! The `mg` command-line tool. `mg configure` is the main entry: it
//! reads `project.toml`, probes the toolchain, and writes the build
//! outputs. `mg init` writes a starter manifest.

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use colored::*;
use std::fs;
use std::path::{Path, PathBuf};

use makegen::installer::Installer;
use makegen::manifest::Manifest;
use makegen::platform::SystemType;
use makegen::project::Project;
use makegen::toolchain::ToolchainContext;

#[derive(Parser)]
#[command(name = "mg")]
#[command(about = "Makefile generator for C projects", version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate Makefile, config.h, and compile_commands.json
    Configure(ConfigureArgs),
    /// Create a starter project.toml in the current directory
    Init {
        /// Package name (defaults to the directory name)
        name: Option<String>,
    },
}

#[derive(Args, Default)]
struct ConfigureArgs {
    /// Path to the project manifest
    #[arg(long, default_value = "project.toml")]
    manifest: PathBuf,

    /// System we are building on (GNU triple)
    #[arg(long)]
    build: Option<String>,
    /// System the artifacts will run on (GNU triple)
    #[arg(long)]
    host: Option<String>,
    /// System the artifacts will generate code for (GNU triple)
    #[arg(long)]
    target: Option<String>,

    /// Installation prefix
    #[arg(long)]
    prefix: Option<String>,
    /// Prefix for architecture-dependent files
    #[arg(long = "exec-prefix")]
    exec_prefix: Option<String>,
    /// User executables
    #[arg(long)]
    bindir: Option<String>,
    /// System administrator executables
    #[arg(long)]
    sbindir: Option<String>,
    /// Object code libraries
    #[arg(long)]
    libdir: Option<String>,
    /// Program executables
    #[arg(long)]
    libexecdir: Option<String>,
    /// C header files
    #[arg(long)]
    includedir: Option<String>,
    /// Read-only architecture-independent data root
    #[arg(long)]
    datarootdir: Option<String>,
    /// Read-only architecture-independent data
    #[arg(long)]
    datadir: Option<String>,
    /// Man documentation
    #[arg(long)]
    mandir: Option<String>,
    /// Read-only single-machine data
    #[arg(long)]
    sysconfdir: Option<String>,
    /// Modifiable single-machine data
    #[arg(long)]
    localstatedir: Option<String>,
}

fn main() {
    let cli = Cli::parse();
    let result = match cli.command {
        Some(Commands::Configure(args)) => configure(args),
        Some(Commands::Init { name }) => init(name),
        // Bare `mg` behaves like a configure script.
        None => configure(ConfigureArgs::default()),
    };
    if let Err(e) = result {
        eprintln!("{} {:#}", "x".red(), e);
        std::process::exit(1);
    }
}

fn configure(args: ConfigureArgs) -> Result<()> {
    let manifest = if args.manifest.as_os_str().is_empty() {
        Manifest::load(Path::new("project.toml"))?
    } else {
        Manifest::load(&args.manifest)?
    };

    let mut installer = Installer::new();
    let overrides: &[(&str, &Option<String>)] = &[
        ("prefix", &args.prefix),
        ("exec-prefix", &args.exec_prefix),
        ("bindir", &args.bindir),
        ("sbindir", &args.sbindir),
        ("libdir", &args.libdir),
        ("libexecdir", &args.libexecdir),
        ("includedir", &args.includedir),
        ("datarootdir", &args.datarootdir),
        ("datadir", &args.datadir),
        ("mandir", &args.mandir),
        ("sysconfdir", &args.sysconfdir),
        ("localstatedir", &args.localstatedir),
    ];
    for (key, value) in overrides {
        if let Some(value) = value {
            installer.override_dir(key, value)?;
        }
    }

    let system = SystemType::new(args.build.clone(), args.host.clone(), args.target.clone());
    let ctx = ToolchainContext::new(system)?;

    let mut project = Project::new(manifest, installer)?;
    println!(
        "{} configuring {} ...",
        "▶".cyan(),
        project.name().bold()
    );
    project.configure(&ctx)?;
    project.finalize(&ctx, Path::new("."))?;
    Ok(())
}

fn init(name: Option<String>) -> Result<()> {
    let manifest_path = Path::new("project.toml");
    if manifest_path.exists() {
        bail!("project.toml already exists in this directory");
    }

    let name = match name {
        Some(name) => name,
        None => std::env::current_dir()
            .ok()
            .and_then(|d| d.file_name().map(|n| n.to_string_lossy().to_string()))
            .unwrap_or_else(|| "myproject".to_string()),
    };

    let template = format!(
        r#"[package]
name = "{name}"
version = "0.1"

[binaries.{name}]
sources = ["src/*.c"]

# [libraries.{name}]
# sources = ["src/lib*.c"]
# abi_major = 0
# abi_minor = 0

# [probes]
# headers = ["sys/epoll.h"]
# funcs = ["strlcpy"]
"#
    );
    fs::write(manifest_path, template).context("failed to write project.toml")?;
    println!("{} created project.toml for `{}`", "✓".green(), name);
    Ok(())
}
