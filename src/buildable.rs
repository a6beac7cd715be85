//! Buildable products and their expansion into build-graph fragments.
//!
//! A [`Buildable`] is one declared artifact; [`BuildKind`] is the closed
//! set of variants. Expansion is a three-stage pipeline: per-source
//! compile targets (depending on the source plus its discovered local
//! headers), one terminal archive/link target, then the bookkeeping
//! edges (`all`, `clean`, `check`, distribution, installation).
//!
//! A `[libraries.<id>]` declaration produces *two* buildables, shared
//! and static, over the same sources. Static objects carry a `-static`
//! suffix before the object extension so the two compilations of each
//! translation unit never collide.

use crate::depscan::DepMap;
use crate::makefile::{InstallOptions, Makefile};
use crate::platform::{SystemType, TargetOs};
use crate::toolchain::{CompileStep, Compiler, LinkStep};
use anyhow::{Context, Result, bail};
use walkdir::WalkDir;

/// Object-name suffix for the static compilation of a translation unit.
const STATIC_OBJECT_SUFFIX: &str = "-static";

/// The closed set of build-product variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildKind {
    Binary,
    SharedLibrary { abi_major: u32, abi_minor: u32 },
    StaticLibrary,
    /// A binary wired into `make check`, never installed.
    Test,
    /// Header files installed verbatim.
    Header,
    /// Interpreted files installed verbatim.
    Script { dest: String, mode: String },
    /// A sub-project with its own configure/make cycle.
    ExternalProject {
        uri: Option<String>,
        configure_args: Vec<String>,
    },
}

/// One declared build product, after manifest parsing.
#[derive(Debug, Clone)]
pub struct Buildable {
    pub id: String,
    pub output: String,
    pub sources: Vec<String>,
    pub cflags: Vec<String>,
    pub ldflags: Vec<String>,
    pub ldadd: Vec<String>,
    pub rpath: Option<String>,
    pub installable: bool,
    pub distributable: bool,
    pub enabled: bool,
    pub kind: BuildKind,
    /// Filled in by the dependency-discovery pass.
    pub deps: DepMap,
}

impl Buildable {
    pub fn new(id: &str, kind: BuildKind) -> Buildable {
        Buildable {
            id: id.to_string(),
            output: id.to_string(),
            sources: Vec::new(),
            cflags: Vec::new(),
            ldflags: Vec::new(),
            ldadd: Vec::new(),
            rpath: None,
            installable: true,
            distributable: true,
            enabled: true,
            kind,
            deps: DepMap::new(),
        }
    }

    /// Whether this product compiles translation units.
    pub fn is_compiled(&self) -> bool {
        matches!(
            self.kind,
            BuildKind::Binary
                | BuildKind::SharedLibrary { .. }
                | BuildKind::StaticLibrary
                | BuildKind::Test
        )
    }

    pub fn is_library(&self) -> bool {
        matches!(
            self.kind,
            BuildKind::SharedLibrary { .. } | BuildKind::StaticLibrary
        )
    }

    /// Expand wildcard sources, verify that every source exists, and
    /// fix the output file name for the target family. Called exactly
    /// once, before dependency discovery and emission.
    pub fn finalize(&mut self, os: TargetOs) -> Result<()> {
        let mut expanded = Vec::new();
        for pattern in &self.sources {
            if pattern.contains('*') {
                let mut matches = expand_wildcard(pattern)
                    .with_context(|| format!("bad source pattern `{}` in `{}`", pattern, self.id))?;
                if matches.is_empty() {
                    bail!("source pattern `{}` in `{}` matches nothing", pattern, self.id);
                }
                matches.sort();
                expanded.extend(matches);
            } else {
                expanded.push(pattern.clone());
            }
        }
        for src in &expanded {
            if !std::path::Path::new(src).exists() {
                bail!("source file `{}` of `{}` does not exist", src, self.id);
            }
        }
        self.sources = expanded;

        self.output = match &self.kind {
            BuildKind::Binary | BuildKind::Test => {
                format!("{}{}", self.id, os.executable_extension())
            }
            BuildKind::SharedLibrary { .. } => {
                format!("lib{}{}", self.id, os.shared_library_extension())
            }
            BuildKind::StaticLibrary => {
                format!("lib{}{}", self.id, os.static_library_extension())
            }
            _ => self.id.clone(),
        };
        Ok(())
    }

    /// The object file compiled from each source, in sorted order.
    /// Static-library objects are suffixed so they never collide with
    /// the shared variant built from the same sources.
    pub fn object_files(&self, os: TargetOs) -> Vec<String> {
        let suffix = match self.kind {
            BuildKind::StaticLibrary => STATIC_OBJECT_SUFFIX,
            _ => "",
        };
        let mut sources = self.sources.clone();
        sources.sort();
        sources
            .iter()
            .map(|src| {
                let stem = src.strip_suffix(".c").unwrap_or(src);
                format!("{}{}{}", stem, suffix, os.object_extension())
            })
            .collect()
    }

    /// The compile steps of this product, one per source.
    pub fn compile_steps(&self, os: TargetOs) -> Vec<CompileStep> {
        let pic = matches!(self.kind, BuildKind::SharedLibrary { .. });
        let mut sources = self.sources.clone();
        sources.sort();
        sources
            .iter()
            .zip(self.object_files(os))
            .map(|(src, obj)| CompileStep::new(src, &obj).cflags(&self.cflags).pic(pic))
            .collect()
    }

    /// Expand this product into its build-graph fragment.
    pub fn expand(&self, cc: &Compiler, system: &SystemType) -> Result<Makefile> {
        let mut mk = Makefile::new(cc.target());
        match &self.kind {
            BuildKind::Header => self.expand_files(&mut mk, "$(INCLUDEDIR)", "644"),
            BuildKind::Script { dest, mode } => {
                let (dest, mode) = (dest.clone(), mode.clone());
                self.expand_files(&mut mk, &dest, &mode)
            }
            BuildKind::ExternalProject { .. } => self.expand_external(&mut mk),
            _ => self.expand_compiled(cc, system, &mut mk)?,
        }
        Ok(mk)
    }

    fn expand_compiled(
        &self,
        cc: &Compiler,
        system: &SystemType,
        mk: &mut Makefile,
    ) -> Result<()> {
        if self.sources.is_empty() {
            bail!("`{}` declares no sources", self.id);
        }

        let objects = self.object_files(cc.target());
        for step in self.compile_steps(cc.target()) {
            let src = &step.sources[0];
            let mut deps = vec![src.clone()];
            if let Some(record) = self.deps.get(src) {
                deps.extend(record.local_headers.iter().cloned());
            }
            let rule = cc.compile_rule(&step)?;
            mk.add_target(&step.output, &deps, &[rule]);
            mk.clean(&step.output);
        }

        let terminal = match &self.kind {
            BuildKind::StaticLibrary => cc.archive(&objects, &self.output),
            kind => {
                let mut step = LinkStep::new(&objects, &self.output)
                    .ldflags(&self.ldflags)
                    .ldadd(&self.ldadd);
                if let BuildKind::SharedLibrary { abi_major, .. } = kind {
                    step = step
                        .shared()
                        .export_dynamic()
                        .soname(&format!("{}.{}", self.output, abi_major));
                }
                if let Some(dir) = &self.rpath {
                    step = step.rpath(dir);
                }
                cc.link_rule(&step)?
            }
        };
        mk.add_target(&self.output, &objects, &[terminal]);
        mk.add_dependency("all", &self.output);
        mk.clean(&self.output);

        if self.distributable {
            for src in &self.sources {
                mk.distribute(src);
            }
        }

        match &self.kind {
            BuildKind::Binary if self.installable => {
                mk.install(&self.output, "$(BINDIR)", InstallOptions::mode("755"));
            }
            BuildKind::SharedLibrary { abi_major, abi_minor } if self.installable => {
                // Installed under the ABI-versioned name; the bare
                // .so stays a build-tree artifact.
                let versioned = format!("{}.{}.{}", self.output, abi_major, abi_minor);
                mk.install(
                    &self.output,
                    "$(LIBDIR)",
                    InstallOptions::renamed("755", versioned),
                );
            }
            // Static archives are a build-time convenience, never
            // installed.
            BuildKind::StaticLibrary => {}
            BuildKind::Test => {
                if !system.host_is_android() {
                    mk.add_dependency("check", &self.output);
                    mk.add_rule("check", &format!("./{}", self.output));
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn expand_files(&self, mk: &mut Makefile, dest: &str, mode: &str) {
        for src in &self.sources {
            if self.distributable {
                mk.distribute(src);
            }
            if self.installable {
                mk.install(src, dest, InstallOptions::mode(mode));
            }
        }
    }

    fn expand_external(&self, mk: &mut Makefile) {
        let stamp = format!("{}-build-stamp", self.id);
        mk.add_dependency("all", &stamp);
        mk.add_target(
            &stamp,
            &[],
            &[
                format!("cd {} && $(MAKE)", self.id),
                format!("touch {}", stamp),
            ],
        );
        mk.add_rule("check", &format!("cd {} && $(MAKE) check", self.id));
        mk.clean(&stamp);
    }
}

/// Expand a `dir/*.c`-style wildcard against the filesystem.
fn expand_wildcard(pattern: &str) -> Result<Vec<String>> {
    let (dir, file_pattern) = match pattern.rsplit_once('/') {
        Some((dir, file)) => (dir.to_string(), file.to_string()),
        None => (".".to_string(), pattern.to_string()),
    };
    if dir.contains('*') {
        bail!("wildcards are only supported in the file name component");
    }
    let matcher = glob_to_regex(&file_pattern)?;

    let mut matches = Vec::new();
    for entry in WalkDir::new(&dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if matcher.is_match(&name) {
            if dir == "." && !pattern.starts_with("./") {
                matches.push(name.to_string());
            } else {
                matches.push(format!("{}/{}", dir, name));
            }
        }
    }
    Ok(matches)
}

fn glob_to_regex(pattern: &str) -> Result<regex::Regex> {
    let mut re = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '*' => re.push_str("[^/]*"),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    regex::Regex::new(&re).context("invalid wildcard pattern")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::depscan::DepRecord;

    fn cc() -> Compiler {
        Compiler::new("cc", TargetOs::Linux)
    }

    fn system() -> SystemType {
        SystemType::default()
    }

    fn binary(id: &str, sources: &[&str]) -> Buildable {
        let mut b = Buildable::new(id, BuildKind::Binary);
        b.sources = sources.iter().map(|s| s.to_string()).collect();
        b.output = id.to_string();
        b
    }

    #[test]
    fn test_object_dependencies_are_source_plus_local_headers() {
        let mut b = binary("prog", &["main.c", "util.c"]);
        b.deps.insert(
            "util.c".into(),
            DepRecord {
                local_headers: vec!["util.h".into()],
                system_headers: vec!["stdio.h".into()],
            },
        );
        let mk = b.expand(&cc(), &system()).unwrap();

        let main_o = mk.target("main.o").unwrap();
        assert_eq!(main_o.deps(), &["main.c"]);

        let util_o = mk.target("util.o").unwrap();
        assert_eq!(util_o.deps(), &["util.c", "util.h"]);

        // System headers drive probes, never rebuilds.
        for t in mk.targets() {
            assert!(!t.deps().iter().any(|d| d == "stdio.h"));
        }

        let link = mk.target("prog").unwrap();
        assert_eq!(link.deps(), &["main.o", "util.o"]);
    }

    #[test]
    fn test_static_and_shared_objects_never_collide() {
        let mut shared = Buildable::new(
            "foo",
            BuildKind::SharedLibrary {
                abi_major: 0,
                abi_minor: 0,
            },
        );
        shared.sources = vec!["foo.c".into()];
        shared.output = "libfoo.so".into();

        let mut stat = Buildable::new("foo", BuildKind::StaticLibrary);
        stat.sources = vec!["foo.c".into()];
        stat.output = "libfoo.a".into();

        let shared_objs = shared.object_files(TargetOs::Linux);
        let static_objs = stat.object_files(TargetOs::Linux);
        assert_eq!(shared_objs, vec!["foo.o"]);
        assert_eq!(static_objs, vec!["foo-static.o"]);

        let mut mk = shared.expand(&cc(), &system()).unwrap();
        mk.merge(stat.expand(&cc(), &system()).unwrap()).unwrap();
        assert!(mk.target("foo.o").is_some());
        assert!(mk.target("foo-static.o").is_some());
        assert!(mk.target("libfoo.so").is_some());
        assert!(mk.target("libfoo.a").is_some());
    }

    #[test]
    fn test_shared_library_compiles_pic_and_links_shared() {
        let mut b = Buildable::new(
            "foo",
            BuildKind::SharedLibrary {
                abi_major: 1,
                abi_minor: 2,
            },
        );
        b.sources = vec!["foo.c".into()];
        b.output = "libfoo.so".into();
        let mk = b.expand(&cc(), &system()).unwrap();

        let obj = mk.target("foo.o").unwrap();
        assert!(obj.rules()[0].contains("-fpic"));

        let lib = mk.target("libfoo.so").unwrap();
        assert!(lib.rules()[0].contains("-shared"));
        assert!(lib.rules()[0].contains("-Wl,-soname,libfoo.so.1"));
    }

    #[test]
    fn test_shared_install_renames_static_installs_nothing() {
        let mut shared = Buildable::new(
            "foo",
            BuildKind::SharedLibrary {
                abi_major: 1,
                abi_minor: 2,
            },
        );
        shared.sources = vec!["foo.c".into()];
        shared.output = "libfoo.so".into();
        let mk = shared.expand(&cc(), &system()).unwrap();
        let install = mk.target("install").unwrap();
        assert!(
            install
                .rules()
                .iter()
                .any(|r| r.ends_with("$(DESTDIR)$(LIBDIR)/libfoo.so.1.2"))
        );

        let mut stat = Buildable::new("foo", BuildKind::StaticLibrary);
        stat.sources = vec!["foo.c".into()];
        stat.output = "libfoo.a".into();
        let mk = stat.expand(&cc(), &system()).unwrap();
        assert!(mk.target("install").unwrap().rules().is_empty());
        assert_eq!(mk.target("libfoo.a").unwrap().rules()[0], "ar rs libfoo.a foo-static.o");
    }

    #[test]
    fn test_test_buildable_wires_check_but_not_install() {
        let mut t = Buildable::new("t_basic", BuildKind::Test);
        t.sources = vec!["t_basic.c".into()];
        t.output = "t_basic".into();
        t.installable = false;
        let mk = t.expand(&cc(), &system()).unwrap();

        let check = mk.target("check").unwrap();
        assert_eq!(check.deps(), &["t_basic"]);
        assert_eq!(check.rules(), &["./t_basic"]);
        assert!(mk.target("install").unwrap().rules().is_empty());
    }

    #[test]
    fn test_android_host_skips_check_wiring() {
        let mut t = Buildable::new("t_basic", BuildKind::Test);
        t.sources = vec!["t_basic.c".into()];
        t.output = "t_basic".into();
        let android = SystemType::new(None, Some("arm-linux-androideabi".into()), None);
        let mk = t.expand(&cc(), &android).unwrap();
        assert!(mk.target("check").unwrap().deps().is_empty());
        assert!(mk.target("check").unwrap().rules().is_empty());
    }

    #[test]
    fn test_external_project_stamp_targets() {
        let ext = Buildable::new(
            "libdispatch",
            BuildKind::ExternalProject {
                uri: None,
                configure_args: vec![],
            },
        );
        let mk = ext.expand(&cc(), &system()).unwrap();
        let stamp = mk.target("libdispatch-build-stamp").unwrap();
        assert_eq!(
            stamp.rules(),
            &["cd libdispatch && $(MAKE)", "touch libdispatch-build-stamp"]
        );
        assert_eq!(mk.target("all").unwrap().deps(), &["libdispatch-build-stamp"]);
        assert!(
            mk.target("check")
                .unwrap()
                .rules()
                .contains(&"cd libdispatch && $(MAKE) check".to_string())
        );
    }

    #[test]
    fn test_expand_with_no_sources_is_an_error() {
        let b = binary("prog", &[]);
        assert!(b.expand(&cc(), &system()).is_err());
    }

    #[test]
    fn test_glob_to_regex() {
        let re = glob_to_regex("*.c").unwrap();
        assert!(re.is_match("main.c"));
        assert!(re.is_match("a.b.c"));
        assert!(!re.is_match("main.h"));
        assert!(!re.is_match("main.cpp"));
    }
}
