//! The build graph: named targets, their dependencies, and shell rules.
//!
//! Every buildable expands into a small [`Makefile`] fragment of its own;
//! fragments are merged into one project-wide graph which is then
//! rendered as text. Merging is structural: dependencies union,
//! rule sequences concatenate, directory-creation and copy batches
//! union. Serialization is deterministic (sorted variables, then sorted
//! targets) so regenerating a Makefile never produces spurious diffs.

use crate::platform::TargetOs;
use anyhow::{Result, bail};
use std::collections::{BTreeMap, HashSet};

/// Phony targets that exist in every graph before any buildable is
/// processed. They are the merge anchors for `clean`, `install`, etc.
pub const PHONY_TARGETS: &[&str] = &[
    "all",
    "check",
    "clean",
    "distclean",
    "install",
    "uninstall",
    "distdir",
];

/// Makefile variable assignment operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    /// `=` recursive assignment.
    Set,
    /// `?=` assign only if unset, used for environment pass-through.
    SetDefault,
}

impl AssignOp {
    fn as_str(self) -> &'static str {
        match self {
            AssignOp::Set => "=",
            AssignOp::SetDefault => "?=",
        }
    }
}

/// A named node in the build graph: one Makefile target.
#[derive(Debug, Clone, Default)]
pub struct Target {
    name: String,
    deps: Vec<String>,
    rules: Vec<String>,
    dirs_to_create: Vec<String>,
    files_to_copy: BTreeMap<String, Vec<String>>,
}

impl Target {
    pub fn new(name: &str) -> Target {
        Target {
            name: name.to_string(),
            ..Target::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn deps(&self) -> &[String] {
        &self.deps
    }

    pub fn rules(&self) -> &[String] {
        &self.rules
    }

    /// Add a dependency edge. Duplicates are suppressed; order of first
    /// insertion is preserved.
    pub fn add_dependency(&mut self, dep: &str) {
        if !self.deps.iter().any(|d| d == dep) {
            self.deps.push(dep.to_string());
        }
    }

    /// Append a shell rule. Rules are a sequence, never de-duplicated.
    pub fn add_rule(&mut self, rule: &str) {
        self.rules.push(rule.to_string());
    }

    /// Ensure a directory exists before any rule of this target runs.
    pub fn mkdir(&mut self, path: &str) {
        if !self.dirs_to_create.iter().any(|p| p == path) {
            self.dirs_to_create.push(path.to_string());
        }
    }

    /// Copy a file into a directory. Copies into the same destination
    /// are batched into a single cp(1) invocation at render time.
    pub fn cp(&mut self, src: &str, dest: &str) {
        self.files_to_copy
            .entry(dest.to_string())
            .or_default()
            .push(src.to_string());
    }

    /// Merge another node for the same target name into this one.
    ///
    /// Merging nodes with different names is a caller bug, not a
    /// recoverable condition.
    pub fn merge(&mut self, other: Target) {
        assert_eq!(
            self.name, other.name,
            "cannot merge target `{}` into `{}`",
            other.name, self.name
        );
        for dep in other.deps {
            self.add_dependency(&dep);
        }
        self.rules.extend(other.rules);
        for dir in other.dirs_to_create {
            self.mkdir(&dir);
        }
        for (dest, sources) in other.files_to_copy {
            self.files_to_copy.entry(dest).or_default().extend(sources);
        }
    }

    fn render(&self, os: TargetOs) -> String {
        let mut out = format!("\n{}:", self.name);
        for dep in &self.deps {
            out.push(' ');
            out.push_str(dep);
        }
        out.push('\n');
        if !self.dirs_to_create.is_empty() {
            out.push('\t');
            out.push_str(&os.mkdir(&self.dirs_to_create));
            out.push('\n');
        }
        for (dest, sources) in &self.files_to_copy {
            out.push('\t');
            out.push_str(&os.cp(sources, dest));
            out.push('\n');
        }
        for rule in &self.rules {
            out.push('\t');
            out.push_str(rule);
            out.push('\n');
        }
        out
    }
}

/// An append-only, mergeable collection of targets plus the variable
/// table that precedes them in the rendered output.
#[derive(Debug, Clone)]
pub struct Makefile {
    os: TargetOs,
    vars: BTreeMap<String, (AssignOp, String)>,
    targets: BTreeMap<String, Target>,
    mkdir_seen: HashSet<String>,
}

impl Makefile {
    pub fn new(os: TargetOs) -> Makefile {
        let mut mf = Makefile {
            os,
            vars: BTreeMap::new(),
            targets: BTreeMap::new(),
            mkdir_seen: HashSet::new(),
        };
        for name in PHONY_TARGETS {
            mf.targets.insert(name.to_string(), Target::new(name));
        }
        mf
    }

    pub fn target_os(&self) -> TargetOs {
        self.os
    }

    pub fn target(&self, name: &str) -> Option<&Target> {
        self.targets.get(name)
    }

    pub fn targets(&self) -> impl Iterator<Item = &Target> {
        self.targets.values()
    }

    /// Define a Makefile variable.
    pub fn define_variable(&mut self, name: &str, op: AssignOp, value: &str) {
        self.vars.insert(name.to_string(), (op, value.to_string()));
    }

    pub fn variable(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(|(_, v)| v.as_str())
    }

    /// Create or merge a target with the given dependencies and rules.
    pub fn add_target(&mut self, name: &str, deps: &[String], rules: &[String]) {
        let entry = self
            .targets
            .entry(name.to_string())
            .or_insert_with(|| Target::new(name));
        for dep in deps {
            entry.add_dependency(dep);
        }
        for rule in rules {
            entry.add_rule(rule);
        }
    }

    /// Append a rule to a target, creating the target if needed.
    pub fn add_rule(&mut self, target: &str, rule: &str) {
        self.targets
            .entry(target.to_string())
            .or_insert_with(|| Target::new(target))
            .add_rule(rule);
    }

    /// Add a dependency edge, creating the target if needed. Idempotent.
    pub fn add_dependency(&mut self, target: &str, dep: &str) {
        self.targets
            .entry(target.to_string())
            .or_insert_with(|| Target::new(target))
            .add_dependency(dep);
    }

    /// Register a file to be copied into the staging directory during
    /// `make distdir`. Paths under a subdirectory register creation of
    /// the matching staging subdirectory first.
    pub fn distribute(&mut self, path: &str) {
        let distdir = self
            .targets
            .get_mut("distdir")
            .expect("distdir target always exists");
        match path.rsplit_once('/') {
            Some((dir, _)) => {
                let dest = format!("$(distdir)/{}", dir);
                distdir.mkdir(&dest);
                distdir.cp(path, &dest);
            }
            None => distdir.cp(path, "$(distdir)"),
        }
    }

    /// Register a file to be removed during `make clean`.
    pub fn clean(&mut self, path: &str) {
        let rule = self.os.rm(std::slice::from_ref(&path.to_string()));
        self.add_rule("clean", &rule);
    }

    /// Register a file to be removed during `make distclean`.
    pub fn distclean(&mut self, path: &str) {
        let rule = self.os.rm(std::slice::from_ref(&path.to_string()));
        self.add_rule("distclean", &rule);
    }

    /// Register `src` for copying into `dest` during `make install`,
    /// with a matching removal under `uninstall`. The destination
    /// directory is created at most once per distinct path, no matter
    /// how many files are installed into it. `rename` installs the file
    /// under a different name (ABI-versioned shared objects).
    pub fn install(&mut self, src: &str, dest: &str, opts: InstallOptions) {
        let mode = opts
            .mode
            .clone()
            .unwrap_or_else(|| default_mode(src).to_string());
        if opts.create_dir && !self.mkdir_seen.contains(dest) {
            self.add_rule(
                "install",
                &format!(
                    "test -e $(DESTDIR){dest} || $(INSTALL) -d -m 755 $(DESTDIR){dest}"
                ),
            );
            self.mkdir_seen.insert(dest.to_string());
        }

        let installed_name = match &opts.rename {
            Some(name) => name.clone(),
            None => basename(src).to_string(),
        };
        match &opts.rename {
            Some(name) => self.add_rule(
                "install",
                &format!("$(INSTALL) -m {mode} {src} $(DESTDIR){dest}/{name}"),
            ),
            None => self.add_rule(
                "install",
                &format!("$(INSTALL) -m {mode} {src} $(DESTDIR){dest}"),
            ),
        }
        let removed = format!("$(DESTDIR){dest}/{installed_name}");
        let rule = self.os.rm(std::slice::from_ref(&removed));
        self.add_rule("uninstall", &rule);
    }

    /// Synthesize the source-distribution targets: the
    /// `<project>-<version>.tar.gz` archive and the `dist` phony that
    /// depends on it.
    pub fn add_dist_archive(&mut self, project: &str, version: &str) {
        let distdir = format!("{}-{}", project, version);
        let distfile = format!("{}.tar.gz", distdir);

        let mut tg = Target::new(&distfile);
        tg.add_rule(&self.os.rmdir(&distdir));
        tg.add_rule(&format!("mkdir {}", distdir));
        tg.add_rule(&format!("$(MAKE) distdir distdir={}", distdir));
        if !self.os.is_windows() {
            tg.add_rule(&format!("rm -rf {distdir}.tar {distdir}.tar.gz"));
            tg.add_rule(&format!("tar cf {distdir}.tar {distdir}"));
            tg.add_rule(&format!("gzip {distdir}.tar"));
            tg.add_rule(&format!("rm -rf {distdir}"));
            self.clean(&distfile);
        }
        match self.targets.get_mut(&distfile) {
            Some(existing) => existing.merge(tg),
            None => {
                self.targets.insert(distfile.clone(), tg);
            }
        }
        self.add_dependency("dist", &distfile);
    }

    /// Merge another graph into this one.
    ///
    /// Variable tables union; redefining a variable with a *different*
    /// value is an error rather than a silent override. Targets merge
    /// per [`Target::merge`].
    pub fn merge(&mut self, other: Makefile) -> Result<()> {
        for (name, (op, value)) in other.vars {
            if let Some((_, existing)) = self.vars.get(&name) {
                if *existing != value {
                    bail!(
                        "conflicting definitions of make variable `{}`: `{}` vs `{}`",
                        name,
                        existing,
                        value
                    );
                }
            }
            self.vars.insert(name, (op, value));
        }
        self.mkdir_seen.extend(other.mkdir_seen);
        for (name, target) in other.targets {
            match self.targets.get_mut(&name) {
                Some(existing) => existing.merge(target),
                None => {
                    self.targets.insert(name, target);
                }
            }
        }
        Ok(())
    }

    /// Render the graph as Makefile text: sorted variables, the default
    /// goal, then sorted targets.
    pub fn render(&self) -> String {
        let mut out = String::from("# AUTOMATICALLY GENERATED -- DO NOT EDIT\n");
        for (name, (op, value)) in &self.vars {
            out.push_str(name);
            out.push_str(op.as_str());
            out.push_str(value);
            out.push('\n');
        }
        out.push_str("\ndefault: all\n");
        for target in self.targets.values() {
            out.push_str(&target.render(self.os));
        }
        out
    }

    pub fn write(&self, path: &std::path::Path) -> Result<()> {
        use anyhow::Context;
        std::fs::write(path, self.render())
            .with_context(|| format!("failed to write {}", path.display()))
    }
}

/// Options for [`Makefile::install`].
#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    pub mode: Option<String>,
    pub create_dir: bool,
    pub rename: Option<String>,
}

impl InstallOptions {
    pub fn mode(mode: &str) -> InstallOptions {
        InstallOptions {
            mode: Some(mode.to_string()),
            create_dir: true,
            rename: None,
        }
    }

    pub fn renamed(mode: &str, name: String) -> InstallOptions {
        InstallOptions {
            mode: Some(mode.to_string()),
            create_dir: true,
            rename: Some(name),
        }
    }
}

fn basename(path: &str) -> &str {
    path.rsplit_once('/').map(|(_, b)| b).unwrap_or(path)
}

fn default_mode(src: &str) -> &'static str {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(meta) = std::fs::metadata(src) {
            if meta.permissions().mode() & 0o111 != 0 {
                return "755";
            }
        }
    }
    let _ = src;
    "644"
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> Makefile {
        Makefile::new(TargetOs::Linux)
    }

    #[test]
    fn test_phony_anchors_exist() {
        let mf = graph();
        for name in PHONY_TARGETS {
            assert!(mf.target(name).is_some(), "{} missing", name);
        }
    }

    #[test]
    fn test_add_target_merges_on_same_name() {
        let mut mf = graph();
        mf.add_target("prog", &["a.o".into()], &["cc -o prog a.o".into()]);
        mf.add_target("prog", &["b.o".into(), "a.o".into()], &[]);
        let t = mf.target("prog").unwrap();
        assert_eq!(t.deps(), &["a.o", "b.o"]);
        assert_eq!(t.rules().len(), 1);
    }

    #[test]
    fn test_dependency_addition_is_idempotent() {
        let mut mf = graph();
        mf.add_dependency("all", "prog");
        mf.add_dependency("all", "prog");
        assert_eq!(mf.target("all").unwrap().deps(), &["prog"]);
    }

    #[test]
    fn test_merge_with_empty_graph_is_identity() {
        let mut mf = graph();
        mf.add_target("prog", &["a.o".into()], &["link".into()]);
        mf.define_variable("CC", AssignOp::Set, "cc");
        let before = mf.render();
        mf.merge(graph()).unwrap();
        assert_eq!(mf.render(), before);
    }

    #[test]
    fn test_self_merge_idempotent_on_deps_but_not_rules() {
        let mut mf = graph();
        mf.add_target("prog", &["a.o".into()], &["link".into()]);
        let copy = mf.clone();
        mf.merge(copy).unwrap();
        let t = mf.target("prog").unwrap();
        assert_eq!(t.deps(), &["a.o"]);
        // Rule sequences concatenate; callers must not rely on rule
        // de-duplication.
        assert_eq!(t.rules().len(), 2);
    }

    #[test]
    fn test_variable_conflict_is_an_error() {
        let mut a = graph();
        a.define_variable("CC", AssignOp::Set, "gcc");
        let mut b = graph();
        b.define_variable("CC", AssignOp::Set, "clang");
        assert!(a.merge(b).is_err());

        let mut c = graph();
        c.define_variable("CC", AssignOp::Set, "gcc");
        assert!(a.merge(c).is_ok());
    }

    #[test]
    fn test_install_creates_each_directory_once() {
        let mut mf = graph();
        mf.install("prog", "$(BINDIR)", InstallOptions::mode("755"));
        mf.install("helper", "$(BINDIR)", InstallOptions::mode("755"));
        let rules = mf.target("install").unwrap().rules();
        let mkdirs = rules.iter().filter(|r| r.contains("-d -m 755")).count();
        let copies = rules.iter().filter(|r| r.starts_with("$(INSTALL) -m")).count();
        assert_eq!(mkdirs, 1);
        assert_eq!(copies, 2);
        assert_eq!(mf.target("uninstall").unwrap().rules().len(), 2);
    }

    #[test]
    fn test_install_rename() {
        let mut mf = graph();
        mf.install(
            "libfoo.so",
            "$(LIBDIR)",
            InstallOptions::renamed("755", "libfoo.so.1.2".into()),
        );
        let rules = mf.target("install").unwrap().rules();
        assert!(rules.iter().any(|r| r.ends_with("$(DESTDIR)$(LIBDIR)/libfoo.so.1.2")));
        let un = mf.target("uninstall").unwrap().rules();
        assert_eq!(un, &["rm -f $(DESTDIR)$(LIBDIR)/libfoo.so.1.2"]);
    }

    #[test]
    fn test_distribute_batches_and_creates_subdirs() {
        let mut mf = graph();
        mf.distribute("README");
        mf.distribute("src/main.c");
        mf.distribute("src/util.c");
        let text = mf.render();
        assert!(text.contains("umask 22 ; mkdir -p $(distdir)/src"));
        assert!(text.contains("cp src/main.c src/util.c $(distdir)/src"));
        assert!(text.contains("cp README $(distdir)"));
    }

    #[test]
    fn test_render_is_sorted_and_deterministic() {
        let mut mf = graph();
        mf.define_variable("LDFLAGS", AssignOp::Set, "");
        mf.define_variable("CC", AssignOp::Set, "cc");
        mf.add_target("zeta", &[], &[]);
        mf.add_target("alpha", &[], &[]);
        let text = mf.render();
        let cc = text.find("CC=cc").unwrap();
        let ld = text.find("LDFLAGS=").unwrap();
        assert!(cc < ld);
        let alpha = text.find("\nalpha:").unwrap();
        let zeta = text.find("\nzeta:").unwrap();
        assert!(alpha < zeta);
        assert!(text.starts_with("# AUTOMATICALLY GENERATED"));
        assert!(text.contains("\ndefault: all\n"));
    }

    #[test]
    fn test_dist_archive_rules() {
        let mut mf = graph();
        mf.add_dist_archive("pkg", "0.3");
        let t = mf.target("pkg-0.3.tar.gz").unwrap();
        assert_eq!(t.rules()[0], "rm -rf pkg-0.3");
        assert!(t.rules().contains(&"$(MAKE) distdir distdir=pkg-0.3".to_string()));
        assert!(t.rules().contains(&"tar cf pkg-0.3.tar pkg-0.3".to_string()));
        assert_eq!(mf.target("dist").unwrap().deps(), &["pkg-0.3.tar.gz"]);
        assert!(
            mf.target("clean")
                .unwrap()
                .rules()
                .contains(&"rm -f pkg-0.3.tar.gz".to_string())
        );
    }

    #[test]
    #[should_panic(expected = "cannot merge target")]
    fn test_mismatched_target_merge_fails_loudly() {
        let mut a = Target::new("a");
        a.merge(Target::new("b"));
    }
}
