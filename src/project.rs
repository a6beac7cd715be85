//! The configure-time orchestrator.
//!
//! A [`Project`] walks the declared buildables through the full
//! pipeline: toolchain detection, external sub-project configuration,
//! source finalization, header dependency discovery, feature probes,
//! and finally the merge of every build-graph fragment into the
//! project-wide graph that gets written out as `Makefile`, `config.h`,
//! and `compile_commands.json`.
//!
//! Graph construction is a deterministic, synchronous fold over the
//! buildables; only the header scans inside the discovery pass run in
//! parallel.

use crate::buildable::{BuildKind, Buildable};
use crate::depscan;
use crate::installer::Installer;
use crate::makefile::{AssignOp, Makefile};
use crate::manifest::Manifest;
use crate::probe::{self, ProbeResults};
use crate::toolchain::{Compiler, ToolchainContext};
use anyhow::{Context, Result, bail};
use colored::*;
use serde::Serialize;
use std::path::Path;

/// Environment variables passed through into the generated Makefile.
const PASSTHROUGH_VARS: &[&str] = &["CFLAGS", "LDFLAGS", "LDADD"];

#[derive(Serialize)]
struct CompileCommand {
    directory: String,
    command: String,
    file: String,
}

pub struct Project {
    manifest: Manifest,
    installer: Installer,
    buildables: Vec<Buildable>,
    cc: Option<Compiler>,
    probe_results: ProbeResults,
}

impl Project {
    pub fn new(manifest: Manifest, installer: Installer) -> Result<Project> {
        let buildables = manifest.to_buildables()?;
        Ok(Project {
            manifest,
            installer,
            buildables,
            cc: None,
            probe_results: ProbeResults::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.manifest.package.name
    }

    /// Examine the operating environment: resolve the toolchain,
    /// configure external sub-projects, expand and check sources,
    /// discover header dependencies, and run the feature probes.
    pub fn configure(&mut self, ctx: &ToolchainContext) -> Result<()> {
        let cc = Compiler::detect(ctx)?;
        self.installer.configure(ctx.target_os)?;

        for b in &self.buildables {
            if let BuildKind::ExternalProject { uri, configure_args } = &b.kind {
                configure_external(&b.id, uri.as_deref(), configure_args)?;
            }
        }

        for b in &mut self.buildables {
            if !b.enabled {
                continue;
            }
            b.finalize(ctx.target_os)?;
        }

        for b in &mut self.buildables {
            if !b.enabled || !b.is_compiled() {
                continue;
            }
            b.deps = depscan::scan_all(&cc, &b.sources, &b.cflags)
                .with_context(|| format!("header scan failed for `{}`", b.id))?;
        }

        let system_headers = self.system_headers();
        self.probe_results = probe::run(&cc, &self.manifest.probes, &system_headers);
        self.cc = Some(cc);
        Ok(())
    }

    /// Every system header referenced by any compiled buildable,
    /// sorted and de-duplicated.
    pub fn system_headers(&self) -> Vec<String> {
        let mut headers: Vec<String> = self
            .buildables
            .iter()
            .flat_map(|b| b.deps.values())
            .flat_map(|rec| rec.system_headers.iter().cloned())
            .collect();
        headers.sort();
        headers.dedup();
        headers
    }

    /// Build the project-wide graph. Only valid after [`configure`].
    ///
    /// [`configure`]: Project::configure
    pub fn to_makefile(&self, ctx: &ToolchainContext) -> Result<Makefile> {
        let cc = self
            .cc
            .as_ref()
            .expect("configure must run before emission");
        let mut mk = Makefile::new(ctx.target_os);

        // `?=` so a make-time override still wins over the value
        // captured at configure time.
        for var in PASSTHROUGH_VARS {
            let value = std::env::var(var).unwrap_or_default();
            mk.define_variable(var, AssignOp::SetDefault, &value);
        }
        mk.define_variable("CC", AssignOp::Set, cc.path());
        mk.define_variable("DISTFILE", AssignOp::Set, &self.manifest.distfile());
        self.installer.define_variables(&mut mk, self.name());

        for b in &self.buildables {
            if !b.enabled {
                continue;
            }
            let fragment = b
                .expand(cc, &ctx.system)
                .with_context(|| format!("failed to expand `{}`", b.id))?;
            mk.merge(fragment)
                .with_context(|| format!("failed to merge `{}` into the build graph", b.id))?;
        }

        for manpage in &self.manifest.manpages {
            let Some((_, section)) = manpage.rsplit_once('.') else {
                bail!("manpage `{}` has no section suffix", manpage);
            };
            mk.distribute(manpage);
            mk.install(
                manpage,
                &format!("$(MANDIR)/man{}", section),
                crate::makefile::InstallOptions::mode("644"),
            );
        }

        for extra in &self.manifest.extra_dist {
            mk.distribute(extra);
        }

        mk.distclean(&self.manifest.package.config_header);
        mk.distclean(&self.manifest.distfile());
        mk.add_dist_archive(&self.manifest.package.name, &self.manifest.package.version);
        Ok(mk)
    }

    /// Write `Makefile`, the feature header, and
    /// `compile_commands.json` into `outdir`.
    pub fn finalize(&self, ctx: &ToolchainContext, outdir: &Path) -> Result<()> {
        let mk = self.to_makefile(ctx)?;

        let makefile_path = outdir.join("Makefile");
        mk.write(&makefile_path)?;
        println!("{} wrote {}", "✓".green(), makefile_path.display());

        let header_path = outdir.join(&self.manifest.package.config_header);
        probe::write_config_h(&header_path, &self.probe_results)?;
        println!("{} wrote {}", "✓".green(), header_path.display());

        self.write_compile_commands(&outdir.join("compile_commands.json"))?;
        Ok(())
    }

    /// One entry per compile rule, with the literal (non-Makefile)
    /// command line, for clangd and friends.
    fn write_compile_commands(&self, path: &Path) -> Result<()> {
        let cc = self
            .cc
            .as_ref()
            .expect("configure must run before emission");
        let directory = std::env::current_dir()
            .map(|d| d.to_string_lossy().to_string())
            .unwrap_or_else(|_| ".".to_string());

        let mut entries = Vec::new();
        for b in &self.buildables {
            if !b.enabled || !b.is_compiled() {
                continue;
            }
            for step in b.compile_steps(cc.target()) {
                entries.push(CompileCommand {
                    directory: directory.clone(),
                    command: cc.compile(&step)?,
                    file: step.sources[0].clone(),
                });
            }
        }
        let json = serde_json::to_string_pretty(&entries)?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("{} wrote {}", "✓".green(), path.display());
        Ok(())
    }
}

/// Run an external sub-project's own configure script. The project must
/// already be present in the tree; a missing or failing sub-project is
/// fatal, since later build rules depend on it.
fn configure_external(id: &str, uri: Option<&str>, args: &[String]) -> Result<()> {
    print!("checking for external project {}... ", id);
    use std::io::Write;
    std::io::stdout().flush().ok();

    if !Path::new(id).is_dir() {
        println!("{}", "no".red());
        match uri {
            Some(uri) => bail!(
                "external project `{}` is not present in the source tree; fetch it from {}",
                id,
                uri
            ),
            None => bail!("external project `{}` is not present in the source tree", id),
        }
    }
    println!("{}", "yes".green());

    let script = format!("cd {} && ./configure {}", id, args.join(" "));
    println!("{} configuring {} ...", "▶".cyan(), id);
    let status = std::process::Command::new("sh")
        .arg("-c")
        .arg(&script)
        .status()
        .with_context(|| format!("failed to run `{}`", script))?;
    if !status.success() {
        bail!("unable to configure external project `{}`", id);
    }
    Ok(())
}
