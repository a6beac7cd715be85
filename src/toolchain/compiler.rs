//! The compiler half of the command synthesizer: compile-step command
//! lines, preprocessor invocations, and configuration-time probe
//! compiles.

use super::{ToolchainContext, Vendor};
use crate::platform::{self, TargetOs};
use anyhow::{Context, Result, bail};
use colored::*;
use std::io::Write;
use std::process::{Command, Stdio};

/// Executable names tried, in order, when `CC` is not set.
const COMPILER_CANDIDATES: &[&str] = &["cc", "gcc", "clang", "cl.exe"];

/// Flags CL.EXE does not understand. Anything matching these is dropped
/// when synthesizing a Microsoft command line; the table is the whole
/// translation, nothing is inferred.
const MSVC_DROPPED_FLAGS: &[&str] = &["-Wall", "-Werror", "-W", "-Wextra", "-pedantic", "-fpic"];
const MSVC_DROPPED_PREFIXES: &[&str] = &["-Wno-", "-std="];

/// A resolved C compiler: executable path, vendor convention, and the
/// target family commands are synthesized for. Immutable once detected;
/// per-step variation lives in [`CompileStep`] and [`LinkStep`], not in
/// mutated copies of this value.
///
/// [`LinkStep`]: super::LinkStep
#[derive(Debug, Clone)]
pub struct Compiler {
    path: String,
    vendor: Vendor,
    target: TargetOs,
}

/// One translation unit (or probe) compiled to one object file.
#[derive(Debug, Clone, Default)]
pub struct CompileStep {
    pub sources: Vec<String>,
    pub output: String,
    pub cflags: Vec<String>,
    pub pic: bool,
}

impl CompileStep {
    pub fn new(source: &str, output: &str) -> CompileStep {
        CompileStep {
            sources: vec![source.to_string()],
            output: output.to_string(),
            ..CompileStep::default()
        }
    }

    pub fn cflags(mut self, flags: &[String]) -> CompileStep {
        self.cflags.extend_from_slice(flags);
        self
    }

    pub fn pic(mut self, pic: bool) -> CompileStep {
        self.pic = pic;
        self
    }
}

impl Compiler {
    /// Build a compiler value from an already-resolved executable.
    pub fn new(path: &str, target: TargetOs) -> Compiler {
        Compiler {
            path: path.to_string(),
            vendor: Vendor::from_executable(path),
            target,
        }
    }

    /// Resolve and verify the C compiler for this run.
    pub fn detect(ctx: &ToolchainContext) -> Result<Compiler> {
        print!("checking for a C compiler... ");
        std::io::stdout().flush().ok();

        let mut resolved = ctx.cc_override.clone();
        if resolved.is_none() {
            for candidate in COMPILER_CANDIDATES {
                if platform::which(candidate).is_some() {
                    resolved = Some(candidate.to_string());
                    break;
                }
            }
        }
        if ctx.target_os.is_windows() && resolved.is_none() {
            resolved = Some("cl.exe".to_string());
        }

        let Some(path) = resolved else {
            println!("{}", "not found".red());
            bail!(
                "no C compiler found (tried: {})",
                COMPILER_CANDIDATES.join(", ")
            );
        };

        let cc = Compiler::new(&path, ctx.target_os);
        if !cc.verify() {
            println!("{}", "not found".red());
            bail!(
                "compiler `{}` could not be executed (tried `{}`)",
                path,
                cc.verify_command_text()
            );
        }
        println!("{}", path.green());
        Ok(cc)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn vendor(&self) -> Vendor {
        self.vendor
    }

    pub fn target(&self) -> TargetOs {
        self.target
    }

    /// The command line that compiles one step, with literal paths.
    pub fn compile(&self, step: &CompileStep) -> Result<String> {
        self.compile_with(step, false)
    }

    /// The same step in Makefile-rule form: `$(CC)` and `$(CFLAGS)`
    /// instead of the literal compiler path and environment flags.
    pub fn compile_rule(&self, step: &CompileStep) -> Result<String> {
        self.compile_with(step, true)
    }

    fn compile_with(&self, step: &CompileStep, rule_form: bool) -> Result<String> {
        if step.sources.is_empty() {
            bail!("cannot compile `{}`: no input sources", step.output);
        }
        let mut tok: Vec<String> = Vec::new();
        tok.push(if rule_form {
            "$(CC)".to_string()
        } else {
            self.path.clone()
        });

        match self.vendor {
            Vendor::Gnu => {
                tok.push("-c".to_string());
                tok.extend(step.cflags.iter().cloned());
                if rule_form {
                    tok.push("$(CFLAGS)".to_string());
                }
                if step.pic {
                    tok.push("-fpic".to_string());
                }
                tok.push("-o".to_string());
                tok.push(self.target.pathspec(&step.output));
            }
            Vendor::Microsoft => {
                tok.push("/nologo".to_string());
                tok.push("/c".to_string());
                for flag in &step.cflags {
                    if msvc_supports(flag) {
                        tok.push(flag.clone());
                    }
                }
                if rule_form {
                    tok.push("$(CFLAGS)".to_string());
                }
                tok.push(format!("/Fo{}", self.target.pathspec(&step.output)));
            }
        }
        for src in &step.sources {
            tok.push(self.target.pathspec(src));
        }
        Ok(tok.join(" "))
    }

    /// A ready-to-run preprocessor invocation for `source`, output on
    /// standard output. Used by the header dependency scanner.
    pub fn preprocess(&self, source: &str, cflags: &[String]) -> Command {
        let mut cmd = Command::new(&self.path);
        match self.vendor {
            Vendor::Gnu => {
                cmd.arg("-E");
                for flag in cflags {
                    cmd.arg(flag);
                }
            }
            Vendor::Microsoft => {
                cmd.arg("/nologo");
                cmd.arg("/E");
                for flag in cflags.iter().filter(|f| msvc_supports(f)) {
                    cmd.arg(flag);
                }
            }
        }
        cmd.arg(source);
        cmd
    }

    /// Compile a scrap of source code, reporting only success or
    /// failure. The scratch object is removed on success. Probe
    /// failures are data, not errors.
    pub fn test_compile(&self, code: &str) -> bool {
        self.probe(code, false)
    }

    /// Compile *and link* a scrap of source code.
    pub fn test_link(&self, code: &str) -> bool {
        self.probe(code, true)
    }

    /// Check whether a system header can be included.
    pub fn check_header(&self, header: &str) -> bool {
        self.test_compile(&format!(
            "#include <{}>\nint main(void) {{ return 0; }}\n",
            header
        ))
    }

    /// Check whether the compiler accepts a command-line option.
    pub fn has_option(&self, option: &str) -> bool {
        let Ok(scratch) = scratch_source("int main(void) { return 0; }\n") else {
            return false;
        };
        let src = scratch.path().to_string_lossy().to_string();
        let out = format!("{}.out", src);
        let step = CompileStep::new(&src, &out).cflags(&[option.to_string()]);
        let ok = self.run_silenced(&step, false, &out);
        if ok {
            std::fs::remove_file(&out).ok();
        }
        ok
    }

    fn probe(&self, code: &str, link: bool) -> bool {
        let Ok(scratch) = scratch_source(code) else {
            return false;
        };
        let src = scratch.path().to_string_lossy().to_string();
        let out = format!("{}.out", src);
        let step = CompileStep::new(&src, &out);
        let ok = self.run_silenced(&step, link, &out);
        if ok {
            std::fs::remove_file(&out).ok();
        }
        ok
    }

    /// Run a compile (or combined compile+link) step as a child process
    /// with all output discarded.
    fn run_silenced(&self, step: &CompileStep, link: bool, output: &str) -> bool {
        let mut cmd = Command::new(&self.path);
        match self.vendor {
            Vendor::Gnu => {
                if !link {
                    cmd.arg("-c");
                }
                for flag in &step.cflags {
                    cmd.arg(flag);
                }
                cmd.arg("-o").arg(output);
            }
            Vendor::Microsoft => {
                cmd.arg("/nologo");
                if !link {
                    cmd.arg("/c");
                }
                for flag in step.cflags.iter().filter(|f| msvc_supports(f)) {
                    cmd.arg(flag);
                }
                if link {
                    cmd.arg(format!("/Fe{}", output));
                } else {
                    cmd.arg(format!("/Fo{}", output));
                }
            }
        }
        for src in &step.sources {
            cmd.arg(src);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        cmd.status().map(|s| s.success()).unwrap_or(false)
    }

    fn verify(&self) -> bool {
        let mut cmd = Command::new(&self.path);
        match self.vendor {
            Vendor::Gnu => {
                cmd.arg("--help");
            }
            Vendor::Microsoft => {
                cmd.arg("/?");
            }
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        cmd.status().map(|s| s.success()).unwrap_or(false)
    }

    fn verify_command_text(&self) -> String {
        match self.vendor {
            Vendor::Gnu => format!("{} --help{}", self.path, self.target.dev_null()),
            Vendor::Microsoft => format!("{} /? <NUL{}", self.path, self.target.dev_null()),
        }
    }

    /// The command that archives objects into a static library.
    pub fn archive(&self, objects: &[String], output: &str) -> String {
        self.target.archiver(output, objects)
    }
}

fn scratch_source(code: &str) -> Result<tempfile::NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("mgprobe")
        .suffix(".c")
        .tempfile()
        .context("failed to create probe scratch file")?;
    file.write_all(code.as_bytes())
        .context("failed to write probe scratch file")?;
    file.flush().ok();
    Ok(file)
}

fn msvc_supports(flag: &str) -> bool {
    if MSVC_DROPPED_FLAGS.contains(&flag) {
        return false;
    }
    !MSVC_DROPPED_PREFIXES.iter().any(|p| flag.starts_with(p))
}
