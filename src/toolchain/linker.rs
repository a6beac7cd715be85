//! The link half of the command synthesizer.
//!
//! A [`LinkStep`] is a value describing one terminal link: the objects,
//! the output, and the knobs that vary per artifact (shared vs
//! executable, soname, rpath). Derived configurations are produced by
//! the chained builder methods, which return a new value each time.
//! Flag spellings come from the compiler's vendor and target family:
//! GNU toolchains get `-Wl,` pass-throughs, the Windows family gets
//! `LINK.EXE /OUT:` and silently has no rpath at all.

use super::compiler::Compiler;
use super::Vendor;
use crate::platform::TargetOs;
use anyhow::{Result, bail};

/// One link of objects into an executable or shared object.
#[derive(Debug, Clone, Default)]
pub struct LinkStep {
    pub objects: Vec<String>,
    pub output: String,
    pub ldflags: Vec<String>,
    pub ldadd: Vec<String>,
    pub rpath: Option<String>,
    pub shared: bool,
    pub soname: Option<String>,
    pub export_dynamic: bool,
}

impl LinkStep {
    pub fn new(objects: &[String], output: &str) -> LinkStep {
        LinkStep {
            objects: objects.to_vec(),
            output: output.to_string(),
            ..LinkStep::default()
        }
    }

    /// Produce a shared object instead of an executable.
    pub fn shared(mut self) -> LinkStep {
        self.shared = true;
        self
    }

    /// Set the ELF soname recorded in the output.
    pub fn soname(mut self, soname: &str) -> LinkStep {
        self.soname = Some(soname.to_string());
        self
    }

    /// Override the dynamic linker search path baked into the output.
    pub fn rpath(mut self, dir: &str) -> LinkStep {
        self.rpath = Some(dir.to_string());
        self
    }

    /// Add all symbols to the dynamic symbol table.
    pub fn export_dynamic(mut self) -> LinkStep {
        self.export_dynamic = true;
        self
    }

    pub fn ldflags(mut self, flags: &[String]) -> LinkStep {
        self.ldflags.extend_from_slice(flags);
        self
    }

    pub fn ldadd(mut self, libs: &[String]) -> LinkStep {
        self.ldadd.extend_from_slice(libs);
        self
    }
}

impl Compiler {
    /// The command line that performs a link step, with literal paths.
    pub fn link(&self, step: &LinkStep) -> Result<String> {
        self.link_with(step, false)
    }

    /// The same step in Makefile-rule form, with `$(CC)`, `$(LDFLAGS)`
    /// and `$(LDADD)` interpolated.
    pub fn link_rule(&self, step: &LinkStep) -> Result<String> {
        self.link_with(step, true)
    }

    fn link_with(&self, step: &LinkStep, rule_form: bool) -> Result<String> {
        if step.objects.is_empty() {
            bail!("cannot link `{}`: no input objects", step.output);
        }
        let mut tok: Vec<String> = Vec::new();
        match self.vendor() {
            Vendor::Gnu => {
                tok.push(if rule_form {
                    "$(CC)".to_string()
                } else {
                    self.path().to_string()
                });
                tok.push("-o".to_string());
                tok.push(step.output.clone());
                if step.shared {
                    tok.push("-shared".to_string());
                    if step.export_dynamic {
                        tok.push("-Wl,-export-dynamic".to_string());
                    }
                }
                if let Some(soname) = &step.soname {
                    tok.push(format!("-Wl,-soname,{}", soname));
                }
                // In-tree libraries resolve before system ones.
                tok.push("-L".to_string());
                tok.push(".".to_string());
                if let Some(dir) = &step.rpath {
                    match self.target() {
                        TargetOs::Linux => {
                            tok.push(format!("-Wl,-rpath,{}", dir));
                            tok.push(format!("-L{}", dir));
                        }
                        TargetOs::Solaris => {
                            tok.push(format!("-Wl,-R,{}", dir));
                            tok.push(format!("-L{}", dir));
                        }
                        // No rpath concept on this family.
                        TargetOs::Windows => {}
                    }
                }
                tok.extend(step.ldflags.iter().cloned());
                if rule_form {
                    tok.push("$(LDFLAGS)".to_string());
                }
                tok.extend(step.objects.iter().cloned());
                tok.extend(step.ldadd.iter().cloned());
                if rule_form {
                    tok.push("$(LDADD)".to_string());
                }
            }
            Vendor::Microsoft => {
                tok.push("LINK.EXE".to_string());
                tok.push(format!("/OUT:\"{}\"", self.target().pathspec(&step.output)));
                if step.shared {
                    tok.push("/DLL".to_string());
                }
                tok.extend(step.ldflags.iter().cloned());
                if rule_form {
                    tok.push("$(LDFLAGS)".to_string());
                }
                for obj in &step.objects {
                    tok.push(self.target().pathspec(obj));
                }
                tok.extend(step.ldadd.iter().cloned());
                if rule_form {
                    tok.push("$(LDADD)".to_string());
                }
            }
        }
        Ok(tok.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn objs() -> Vec<String> {
        vec!["a.o".to_string(), "b.o".to_string()]
    }

    fn cc(os: TargetOs) -> Compiler {
        Compiler::new("cc", os)
    }

    #[test]
    fn test_plain_link() {
        let step = LinkStep::new(&objs(), "prog");
        let cmd = cc(TargetOs::Linux).link(&step).unwrap();
        assert_eq!(cmd, "cc -o prog -L . a.o b.o");
    }

    #[test]
    fn test_link_rule_form() {
        let step = LinkStep::new(&objs(), "prog").ldadd(&["-lm".to_string()]);
        let rule = cc(TargetOs::Linux).link_rule(&step).unwrap();
        assert_eq!(rule, "$(CC) -o prog -L . $(LDFLAGS) a.o b.o -lm $(LDADD)");
    }

    #[test]
    fn test_shared_library_flags() {
        let step = LinkStep::new(&objs(), "libx.so")
            .shared()
            .export_dynamic()
            .soname("libx.so.1");
        let cmd = cc(TargetOs::Linux).link(&step).unwrap();
        assert!(cmd.contains("-shared"));
        assert!(cmd.contains("-Wl,-export-dynamic"));
        assert!(cmd.contains("-Wl,-soname,libx.so.1"));
    }

    #[test]
    fn test_rpath_spelling_per_family() {
        let step = LinkStep::new(&objs(), "prog").rpath("/opt/lib");
        let linux = cc(TargetOs::Linux).link(&step).unwrap();
        assert!(linux.contains("-Wl,-rpath,/opt/lib"));
        assert!(linux.contains("-L/opt/lib"));

        let solaris = cc(TargetOs::Solaris).link(&step).unwrap();
        assert!(solaris.contains("-Wl,-R,/opt/lib"));
        assert!(!solaris.contains("-rpath"));
    }

    #[test]
    fn test_windows_family_has_no_rpath() {
        let step = LinkStep::new(&objs(), "prog.exe").rpath("/opt/lib");
        let cmd = Compiler::new("cl.exe", TargetOs::Windows).link(&step).unwrap();
        assert!(cmd.starts_with("LINK.EXE /OUT:\"prog.exe\""));
        assert!(!cmd.contains("rpath"));
        assert!(!cmd.contains("/opt/lib"));
    }

    #[test]
    fn test_windows_shared_is_dll_without_export_flag() {
        let step = LinkStep::new(&objs(), "x.dll").shared().export_dynamic();
        let cmd = Compiler::new("cl.exe", TargetOs::Windows).link(&step).unwrap();
        assert!(cmd.contains("/DLL"));
        assert!(!cmd.contains("export-dynamic"));
    }

    #[test]
    fn test_zero_objects_is_a_hard_error() {
        let step = LinkStep::new(&[], "prog");
        assert!(cc(TargetOs::Linux).link(&step).is_err());
    }
}
