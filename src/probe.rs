//! Configuration-time feature probes and the generated config.h.
//!
//! A probe is a throwaway compile (or compile+link) answering one
//! question: is this header present, is this symbol declared, does this
//! function link. Results are plain booleans; a failed probe is a
//! negative answer, never an error. The collected answers become
//! `#define HAVE_...` / `#undef HAVE_...` lines in the feature header.

use crate::toolchain::Compiler;
use anyhow::{Context, Result};
use colored::*;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

/// Probe requests from the manifest.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProbeSet {
    /// Headers whose presence should be checked, beyond those the
    /// dependency scanner discovers on its own.
    #[serde(default)]
    pub headers: Vec<String>,
    /// Header to the symbols that should be declared by it.
    #[serde(default)]
    pub decls: BTreeMap<String, Vec<String>>,
    /// Functions that should be resolvable by the link editor.
    #[serde(default)]
    pub funcs: Vec<String>,
}

/// Probe name (already in `HAVE_...` shape) to outcome.
pub type ProbeResults = BTreeMap<String, bool>;

/// Run every requested probe plus an availability check for each
/// discovered system header.
pub fn run(cc: &Compiler, set: &ProbeSet, system_headers: &[String]) -> ProbeResults {
    let mut results = ProbeResults::new();

    let mut headers: Vec<&String> = system_headers.iter().chain(set.headers.iter()).collect();
    headers.sort();
    headers.dedup();
    for header in headers {
        let key = format!("HAVE_{}", mangle(header));
        if results.contains_key(&key) {
            continue;
        }
        announce(&format!("checking for {}... ", header));
        let found = cc.check_header(header);
        conclude(found);
        results.insert(key, found);
    }

    for (header, decls) in &set.decls {
        for decl in decls {
            let key = format!("HAVE_DECL_{}", mangle(decl));
            if results.contains_key(&key) {
                continue;
            }
            announce(&format!("checking whether {} is declared... ", decl));
            let code = format!(
                "#define _GNU_SOURCE\n#include <{}>\nint main() {{ {}; }}\n",
                header, decl
            );
            let found = cc.test_compile(&code);
            conclude(found);
            results.insert(key, found);
        }
    }

    for func in &set.funcs {
        let key = format!("HAVE_{}", mangle(func));
        if results.contains_key(&key) {
            continue;
        }
        announce(&format!("checking for {}... ", func));
        let code = format!(
            "void *{func}();\nint main() {{ void *p;\np = &{func}; }}\n",
            func = func
        );
        let found = cc.test_link(&code);
        conclude(found);
        results.insert(key, found);
    }

    results
}

/// Render the feature header from probe outcomes.
pub fn config_h(results: &ProbeResults) -> String {
    let mut out = String::from("/* AUTOMATICALLY GENERATED -- DO NOT EDIT */\n");
    for (name, found) in results {
        if *found {
            out.push_str(&format!("#define {} 1\n", name));
        } else {
            out.push_str(&format!("#undef  {}\n", name));
        }
    }
    out
}

pub fn write_config_h(path: &Path, results: &ProbeResults) -> Result<()> {
    std::fs::write(path, config_h(results))
        .with_context(|| format!("failed to write {}", path.display()))
}

/// Uppercase and squash path punctuation, `sys/types.h` becoming
/// `SYS_TYPES_H`.
fn mangle(name: &str) -> String {
    name.to_uppercase()
        .chars()
        .map(|c| if matches!(c, '/' | '.' | '-') { '_' } else { c })
        .collect()
}

fn announce(msg: &str) {
    print!("{}", msg);
    std::io::stdout().flush().ok();
}

fn conclude(found: bool) {
    if found {
        println!("{}", "yes".green());
    } else {
        println!("{}", "no".yellow());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mangle_probe_names() {
        assert_eq!(mangle("stdio.h"), "STDIO_H");
        assert_eq!(mangle("sys/types.h"), "SYS_TYPES_H");
        assert_eq!(mangle("pthread-np.h"), "PTHREAD_NP_H");
    }

    #[test]
    fn test_config_h_rendering() {
        let mut results = ProbeResults::new();
        results.insert("HAVE_STDIO_H".into(), true);
        results.insert("HAVE_EPOLL_CREATE".into(), false);
        let text = config_h(&results);
        assert!(text.starts_with("/* AUTOMATICALLY GENERATED"));
        assert!(text.contains("#define HAVE_STDIO_H 1\n"));
        assert!(text.contains("#undef  HAVE_EPOLL_CREATE\n"));
        // Sorted output: EPOLL before STDIO.
        assert!(text.find("EPOLL").unwrap() < text.find("STDIO").unwrap());
    }
}
