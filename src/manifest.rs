//! Project manifest parsing (`project.toml`).
//!
//! The manifest is the declarative description of what to build:
//! binaries, libraries, headers, manual pages, scripts, tests, external
//! sub-projects, and feature-probe requests. Parsing is strict about
//! shape (serde) and the conversion to buildables validates the rest:
//! a compiled artifact without sources is a configuration error, not
//! something discovered later during emission.

use crate::buildable::{BuildKind, Buildable};
use crate::probe::ProbeSet;
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Default, Deserialize)]
pub struct Manifest {
    pub package: PackageSection,
    #[serde(default)]
    pub binaries: BTreeMap<String, ArtifactDecl>,
    #[serde(default)]
    pub libraries: BTreeMap<String, ArtifactDecl>,
    #[serde(default)]
    pub tests: BTreeMap<String, ArtifactDecl>,
    #[serde(default)]
    pub scripts: BTreeMap<String, ScriptDecl>,
    #[serde(default)]
    pub external: BTreeMap<String, ExternalDecl>,
    /// Header files installed into `$(INCLUDEDIR)`.
    #[serde(default)]
    pub headers: Vec<String>,
    /// Manual pages; the install section comes from the file suffix.
    #[serde(default)]
    pub manpages: Vec<String>,
    /// Extra files carried into the source distribution.
    #[serde(default)]
    pub extra_dist: Vec<String>,
    #[serde(default)]
    pub probes: ProbeSet,
}

#[derive(Debug, Default, Deserialize)]
pub struct PackageSection {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    /// Output name of the feature header.
    #[serde(default = "default_config_header")]
    pub config_header: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ArtifactDecl {
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub cflags: Vec<String>,
    #[serde(default)]
    pub ldflags: Vec<String>,
    #[serde(default)]
    pub ldadd: Vec<String>,
    #[serde(default)]
    pub rpath: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub installable: bool,
    #[serde(default = "default_true")]
    pub distributable: bool,
    // Library-only knobs.
    #[serde(default)]
    pub abi_major: u32,
    #[serde(default)]
    pub abi_minor: u32,
    #[serde(default = "default_true")]
    pub enable_shared: bool,
    #[serde(default = "default_true")]
    pub enable_static: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct ScriptDecl {
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default = "default_script_dest")]
    pub dest: String,
    #[serde(default = "default_script_mode")]
    pub mode: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExternalDecl {
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub configure_args: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_config_header() -> String {
    "config.h".to_string()
}

fn default_script_dest() -> String {
    "$(BINDIR)".to_string()
}

fn default_script_mode() -> String {
    "755".to_string()
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Manifest> {
        if !path.exists() {
            bail!(
                "{} not found in the current directory.\n\n\
                 Tip: run 'mg init' to create one.",
                path.display()
            );
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let manifest: Manifest = toml::from_str(&text)
            .with_context(|| format!("failed to parse {} - check for syntax errors", path.display()))?;
        if manifest.package.name.is_empty() {
            bail!("package.name must not be empty");
        }
        if manifest.package.version.is_empty() {
            bail!("package.version must not be empty");
        }
        Ok(manifest)
    }

    /// The file name of the source distribution archive.
    pub fn distfile(&self) -> String {
        format!("{}-{}.tar.gz", self.package.name, self.package.version)
    }

    /// Convert every declaration into buildables. A `[libraries.<id>]`
    /// entry fans out into its shared and static variants.
    pub fn to_buildables(&self) -> Result<Vec<Buildable>> {
        let mut out = Vec::new();

        for (id, decl) in &self.binaries {
            out.push(compiled(id, decl, BuildKind::Binary)?);
        }

        for (id, decl) in &self.libraries {
            if !decl.enable_shared && !decl.enable_static {
                bail!("library `{}` disables both its shared and static variants", id);
            }
            if decl.enable_shared {
                out.push(compiled(
                    id,
                    decl,
                    BuildKind::SharedLibrary {
                        abi_major: decl.abi_major,
                        abi_minor: decl.abi_minor,
                    },
                )?);
            }
            if decl.enable_static {
                out.push(compiled(id, decl, BuildKind::StaticLibrary)?);
            }
        }

        for (id, decl) in &self.tests {
            let mut b = compiled(id, decl, BuildKind::Test)?;
            b.installable = false;
            b.distributable = false;
            // Unit tests should be debuggable and find in-tree
            // headers and libraries without installation.
            b.cflags.push("-g".to_string());
            b.cflags.push("-O0".to_string());
            b.cflags.push("-I.".to_string());
            if Path::new("./include").is_dir() {
                b.cflags.push("-I./include".to_string());
            }
            if b.rpath.is_none() {
                b.rpath = Some("$$PWD".to_string());
            }
            out.push(b);
        }

        for (id, decl) in &self.scripts {
            if decl.sources.is_empty() {
                bail!("script `{}` declares no sources", id);
            }
            let mut b = Buildable::new(
                id,
                BuildKind::Script {
                    dest: decl.dest.clone(),
                    mode: decl.mode.clone(),
                },
            );
            b.sources = decl.sources.clone();
            out.push(b);
        }

        if !self.headers.is_empty() {
            let mut b = Buildable::new("headers", BuildKind::Header);
            b.sources = self.headers.clone();
            out.push(b);
        }

        for (id, decl) in &self.external {
            let mut b = Buildable::new(
                id,
                BuildKind::ExternalProject {
                    uri: decl.uri.clone(),
                    configure_args: decl.configure_args.clone(),
                },
            );
            b.installable = false;
            b.distributable = false;
            out.push(b);
        }

        Ok(out)
    }
}

fn compiled(id: &str, decl: &ArtifactDecl, kind: BuildKind) -> Result<Buildable> {
    if decl.sources.is_empty() {
        bail!("`{}` declares no sources", id);
    }
    let mut b = Buildable::new(id, kind);
    b.sources = decl.sources.clone();
    b.cflags = decl.cflags.clone();
    b.ldflags = decl.ldflags.clone();
    b.ldadd = decl.ldadd.clone();
    b.rpath = decl.rpath.clone();
    b.enabled = decl.enabled;
    b.installable = decl.installable;
    b.distributable = decl.distributable;
    Ok(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Top-level keys come before the first table header.
    const MANIFEST: &str = r#"
headers = ["include/kq.h"]
manpages = ["kqtool.1"]

[package]
name = "kq"
version = "0.4"

[binaries.kqtool]
sources = ["src/main.c", "src/args.c"]
ldadd = ["-lm"]

[libraries.kq]
sources = ["src/kq.c"]
abi_major = 2
abi_minor = 1

[tests.t_basic]
sources = ["test/t_basic.c"]

[probes]
headers = ["sys/event.h"]
funcs = ["kqueue"]

[probes.decls]
"fcntl.h" = ["O_CLOEXEC"]
"#;

    #[test]
    fn test_parse_manifest() {
        let m: Manifest = toml::from_str(MANIFEST).unwrap();
        assert_eq!(m.package.name, "kq");
        assert_eq!(m.package.config_header, "config.h");
        assert_eq!(m.distfile(), "kq-0.4.tar.gz");
        assert_eq!(m.binaries["kqtool"].ldadd, vec!["-lm"]);
        assert_eq!(m.probes.decls["fcntl.h"], vec!["O_CLOEXEC"]);
        assert_eq!(m.manpages, vec!["kqtool.1"]);
    }

    #[test]
    fn test_library_fans_out_into_both_variants() {
        let m: Manifest = toml::from_str(MANIFEST).unwrap();
        let buildables = m.to_buildables().unwrap();
        let kinds: Vec<&BuildKind> = buildables
            .iter()
            .filter(|b| b.id == "kq")
            .map(|b| &b.kind)
            .collect();
        assert_eq!(kinds.len(), 2);
        assert!(matches!(
            kinds[0],
            BuildKind::SharedLibrary {
                abi_major: 2,
                abi_minor: 1
            }
        ));
        assert!(matches!(kinds[1], BuildKind::StaticLibrary));
    }

    #[test]
    fn test_test_declarations_get_debug_defaults() {
        let m: Manifest = toml::from_str(MANIFEST).unwrap();
        let buildables = m.to_buildables().unwrap();
        let t = buildables.iter().find(|b| b.id == "t_basic").unwrap();
        assert!(!t.installable);
        assert!(!t.distributable);
        assert!(t.cflags.contains(&"-g".to_string()));
        assert!(t.cflags.contains(&"-O0".to_string()));
        assert_eq!(t.rpath.as_deref(), Some("$$PWD"));
    }

    #[test]
    fn test_compiled_artifact_without_sources_is_rejected() {
        let text = r#"
[package]
name = "x"
version = "0.1"

[binaries.empty]
"#;
        let m: Manifest = toml::from_str(text).unwrap();
        assert!(m.to_buildables().is_err());
    }

    #[test]
    fn test_library_with_both_variants_disabled_is_rejected() {
        let text = r#"
[package]
name = "x"
version = "0.1"

[libraries.y]
sources = ["y.c"]
enable_shared = false
enable_static = false
"#;
        let m: Manifest = toml::from_str(text).unwrap();
        assert!(m.to_buildables().is_err());
    }
}
