//! Installation path configuration.
//!
//! The GNU-style directory variable table (`prefix`, `bindir`, …) and
//! the lookup of a BSD-compatible install(1) utility. The table feeds
//! the variable section of the generated Makefile; every entry can be
//! overridden from the command line.

use crate::makefile::{AssignOp, Makefile};
use crate::platform::TargetOs;
use anyhow::{Result, bail};
use colored::*;
use std::collections::BTreeMap;
use std::io::Write;

/// Default directory table, in the order GNU configure documents it.
const INSTALL_DIRS: &[(&str, &str)] = &[
    ("prefix", "/usr/local"),
    ("exec-prefix", "$(PREFIX)"),
    ("bindir", "$(EPREFIX)/bin"),
    ("sbindir", "$(EPREFIX)/sbin"),
    ("libdir", "$(EPREFIX)/lib"),
    ("libexecdir", "$(EPREFIX)/libexec"),
    ("includedir", "$(PREFIX)/include"),
    ("oldincludedir", "/usr/include"),
    ("datarootdir", "$(PREFIX)/share"),
    ("datadir", "$(DATAROOTDIR)"),
    ("docdir", "$(DATAROOTDIR)/doc/$(PACKAGE)"),
    ("infodir", "$(DATAROOTDIR)/info"),
    ("localedir", "$(DATAROOTDIR)/locale"),
    ("mandir", "$(DATAROOTDIR)/man"),
    ("sysconfdir", "$(PREFIX)/etc"),
    ("localstatedir", "$(PREFIX)/var"),
    ("sharedstatedir", "$(PREFIX)/com"),
];

/// Candidate locations for install(1), tried after the `INSTALL`
/// environment override.
const INSTALL_CANDIDATES: &[&str] = &["/usr/ucb/install", "/usr/bin/install"];

#[derive(Debug, Clone)]
pub struct Installer {
    dirs: BTreeMap<String, String>,
    path: Option<String>,
}

impl Default for Installer {
    fn default() -> Installer {
        Installer::new()
    }
}

impl Installer {
    pub fn new() -> Installer {
        Installer {
            dirs: INSTALL_DIRS
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            path: None,
        }
    }

    /// Override one directory entry (`--bindir`, etc.).
    pub fn override_dir(&mut self, key: &str, value: &str) -> Result<()> {
        if !self.dirs.contains_key(key) {
            bail!("unknown installation directory `{}`", key);
        }
        self.dirs.insert(key.to_string(), value.to_string());
        Ok(())
    }

    /// Locate a usable install(1). Mandatory on Unix-family targets;
    /// the Windows family has no such convention and skips the search.
    pub fn configure(&mut self, os: TargetOs) -> Result<()> {
        if os.is_windows() {
            return Ok(());
        }
        print!("checking for a BSD-compatible install... ");
        std::io::stdout().flush().ok();

        let mut candidates: Vec<String> = Vec::new();
        if let Ok(env) = std::env::var("INSTALL") {
            if !env.is_empty() {
                candidates.push(env);
            }
        }
        candidates.extend(INSTALL_CANDIDATES.iter().map(|s| s.to_string()));

        for candidate in &candidates {
            if std::path::Path::new(candidate).exists() {
                println!("{}", candidate.green());
                self.path = Some(candidate.clone());
                return Ok(());
            }
        }
        println!("{}", "not found".red());
        bail!("no install utility found (tried: {})", candidates.join(", "));
    }

    /// Contribute the variable table to a build graph.
    pub fn define_variables(&self, mk: &mut Makefile, package: &str) {
        mk.define_variable("PACKAGE", AssignOp::Set, package);
        mk.define_variable("PKGINCLUDEDIR", AssignOp::Set, "$(INCLUDEDIR)/$(PACKAGE)");
        mk.define_variable("PKGDATADIR", AssignOp::Set, "$(DATADIR)/$(PACKAGE)");
        mk.define_variable("PKGLIBDIR", AssignOp::Set, "$(LIBDIR)/$(PACKAGE)");
        if let Some(path) = &self.path {
            mk.define_variable("INSTALL", AssignOp::Set, path);
        }
        for (key, value) in &self.dirs {
            let var = if key == "exec-prefix" {
                "EPREFIX".to_string()
            } else {
                key.to_uppercase()
            };
            mk.define_variable(&var, AssignOp::Set, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variable_table() {
        let installer = Installer::new();
        let mut mk = Makefile::new(TargetOs::Linux);
        installer.define_variables(&mut mk, "kq");
        assert_eq!(mk.variable("PACKAGE"), Some("kq"));
        assert_eq!(mk.variable("PREFIX"), Some("/usr/local"));
        assert_eq!(mk.variable("EPREFIX"), Some("$(PREFIX)"));
        assert_eq!(mk.variable("BINDIR"), Some("$(EPREFIX)/bin"));
        assert_eq!(mk.variable("MANDIR"), Some("$(DATAROOTDIR)/man"));
        assert_eq!(mk.variable("PKGLIBDIR"), Some("$(LIBDIR)/$(PACKAGE)"));
    }

    #[test]
    fn test_dir_overrides() {
        let mut installer = Installer::new();
        installer.override_dir("prefix", "/opt/kq").unwrap();
        assert!(installer.override_dir("no-such-dir", "/x").is_err());

        let mut mk = Makefile::new(TargetOs::Linux);
        installer.define_variables(&mut mk, "kq");
        assert_eq!(mk.variable("PREFIX"), Some("/opt/kq"));
    }
}
