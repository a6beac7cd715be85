//! Toolchain conventions per target operating system family.
//!
//! Everything in this module is a pure function of [`TargetOs`]: file
//! extensions, archiver invocations, shell command spellings, and
//! null-device redirection. The rest of the crate never branches on
//! `cfg!(windows)` for *target* decisions; it asks this module instead,
//! so cross-generation (configuring on Linux for a Windows toolchain)
//! produces the same Makefile text everywhere.

use anyhow::{Result, bail};
use std::path::{Path, PathBuf};

/// The three toolchain families we know how to emit commands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetOs {
    /// ELF platforms using GNU-style linkers (`-Wl,-rpath`).
    Linux,
    /// Solaris and illumos (`-Wl,-R`).
    Solaris,
    /// MSVC-convention platforms. No rpath concept, `.obj`/`.lib`/`.dll`.
    Windows,
}

impl TargetOs {
    /// The family of the machine we are running on.
    pub fn native() -> TargetOs {
        if cfg!(windows) {
            TargetOs::Windows
        } else if cfg!(target_os = "solaris") || cfg!(target_os = "illumos") {
            TargetOs::Solaris
        } else {
            TargetOs::Linux
        }
    }

    /// Map a GNU config triple (e.g. `x86_64-pc-linux-gnu`) to a family.
    ///
    /// A triple naming an operating system we have no command tables for
    /// is a configuration error, not a silent fallback.
    pub fn from_triple(triple: &str) -> Result<TargetOs> {
        let t = triple.to_lowercase();
        if t.contains("linux") || t.contains("android") {
            Ok(TargetOs::Linux)
        } else if t.contains("solaris") || t.contains("illumos") {
            Ok(TargetOs::Solaris)
        } else if t.contains("mingw") || t.contains("windows") || t.contains("mswin") {
            Ok(TargetOs::Windows)
        } else {
            bail!("unsupported operating system in triple `{}`", triple)
        }
    }

    pub fn is_windows(self) -> bool {
        self == TargetOs::Windows
    }

    /// The extension used for executable files.
    pub fn executable_extension(self) -> &'static str {
        if self.is_windows() { ".exe" } else { "" }
    }

    /// The extension used for intermediate object files.
    pub fn object_extension(self) -> &'static str {
        if self.is_windows() { ".obj" } else { ".o" }
    }

    /// The extension used for static libraries.
    pub fn static_library_extension(self) -> &'static str {
        if self.is_windows() { ".lib" } else { ".a" }
    }

    /// The extension used for shared libraries.
    pub fn shared_library_extension(self) -> &'static str {
        if self.is_windows() { ".dll" } else { ".so" }
    }

    /// Shell command that archives `members` into the static library
    /// `output`.
    pub fn archiver(self, output: &str, members: &[String]) -> String {
        if self.is_windows() {
            format!("lib.exe {} /OUT:{}", members.join(" "), output)
        } else {
            format!("ar rs {} {}", output, members.join(" "))
        }
    }

    /// Redirection suffix that discards all output.
    pub fn dev_null(self) -> &'static str {
        if self.is_windows() { " >NUL 2>NUL" } else { " >/dev/null 2>&1" }
    }

    /// Redirection suffix that discards standard error only.
    pub fn dev_null_stderr(self) -> &'static str {
        if self.is_windows() { " 2>NUL" } else { " 2>/dev/null" }
    }

    /// Shell command that removes regular files.
    pub fn rm(self, paths: &[String]) -> String {
        if self.is_windows() {
            format!("del /F {}", paths.join(" "))
        } else {
            format!("rm -f {}", paths.join(" "))
        }
    }

    /// Shell command that removes a directory tree.
    pub fn rmdir(self, path: &str) -> String {
        if self.is_windows() {
            format!("rmdir /S /Q {}", path)
        } else {
            format!("rm -rf {}", path)
        }
    }

    /// Shell command that copies `sources` into the directory `dest`.
    /// Sources are batched into one invocation.
    pub fn cp(self, sources: &[String], dest: &str) -> String {
        if self.is_windows() {
            format!("copy {} {}", sources.join(" "), dest)
        } else {
            format!("cp {} {}", sources.join(" "), dest)
        }
    }

    /// Shell command that creates directories, parents included.
    pub fn mkdir(self, paths: &[String]) -> String {
        if self.is_windows() {
            format!("mkdir {}", paths.join(" "))
        } else {
            format!("umask 22 ; mkdir -p {}", paths.join(" "))
        }
    }

    /// Rewrite a path with the separator convention of the target family.
    pub fn pathspec(self, path: &str) -> String {
        if self.is_windows() {
            path.replace('/', "\\")
        } else {
            path.to_string()
        }
    }
}

/// Emulate which(1): resolve `command` against the `PATH` of the machine
/// running the generator.
pub fn which(command: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    for prefix in std::env::split_paths(&path) {
        let candidate = prefix.join(command);
        if is_executable(&candidate) {
            return Some(candidate);
        }
        if cfg!(windows) {
            let exe = prefix.join(format!("{}.exe", command));
            if exe.is_file() {
                return Some(exe);
            }
        }
    }
    None
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// The build/host/target triples of a configure run, GNU style.
///
/// `build` is the machine running the generator; `host` is the machine
/// the artifacts will run on. Both default to the native system and are
/// overridden by `--build`/`--host`/`--target`.
#[derive(Debug, Clone, Default)]
pub struct SystemType {
    pub build: Option<String>,
    pub host: Option<String>,
    pub target: Option<String>,
}

impl SystemType {
    pub fn new(build: Option<String>, host: Option<String>, target: Option<String>) -> SystemType {
        SystemType { build, host, target }
    }

    /// The target family artifacts are generated for.
    pub fn target_os(&self) -> Result<TargetOs> {
        match self.host.as_deref().or(self.target.as_deref()) {
            Some(triple) => TargetOs::from_triple(triple),
            None => Ok(TargetOs::native()),
        }
    }

    /// Android builds objects through an external toolchain bridge, so
    /// generated test-invocation rules would not be runnable.
    pub fn host_is_android(&self) -> bool {
        self.host
            .as_deref()
            .map(|h| h.ends_with("-androideabi"))
            .unwrap_or(false)
    }
}
