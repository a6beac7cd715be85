//! Header dependency discovery.
//!
//! For each translation unit we run the toolchain preprocessor and read
//! its line-marker output (`# <line> "<path>"`) to learn which
//! project-local headers the unit really pulls in. Those headers become
//! Makefile dependencies of the object file, so editing a header
//! triggers exactly the right recompilations.
//!
//! System headers (`#include <...>`) are collected separately by plain
//! textual scanning of the source plus each discovered local header,
//! one level deep, not a full transitive preprocess. They feed the
//! configuration-time availability probes, never rebuild triggers.

use crate::toolchain::Compiler;
use anyhow::{Context, Result};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use regex::Regex;
use std::collections::BTreeMap;
use std::process::Stdio;

/// Discovered header dependencies for one source file. Both lists are
/// sorted and free of duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DepRecord {
    pub local_headers: Vec<String>,
    pub system_headers: Vec<String>,
}

/// Source path to its dependency record.
pub type DepMap = BTreeMap<String, DepRecord>;

/// Scan one source file.
pub fn scan_source(cc: &Compiler, source: &str, cflags: &[String]) -> Result<DepRecord> {
    let output = cc
        .preprocess(source, cflags)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .with_context(|| format!("failed to run the preprocessor on {}", source))?;
    let text = String::from_utf8_lossy(&output.stdout);

    let mut local_headers = parse_line_markers(&text);
    local_headers.sort();
    local_headers.dedup();

    let mut system_headers = Vec::new();
    collect_system_includes(source, &mut system_headers);
    for header in &local_headers {
        collect_system_includes(header, &mut system_headers);
    }
    system_headers.sort();
    system_headers.dedup();

    Ok(DepRecord {
        local_headers,
        system_headers,
    })
}

/// Scan every source of a buildable. Sources are independent, so the
/// preprocessor runs go wide; the records come back merged in
/// deterministic order.
pub fn scan_all(cc: &Compiler, sources: &[String], cflags: &[String]) -> Result<DepMap> {
    let pb = ProgressBar::new(sources.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("   {bar:30.cyan/blue} {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );
    pb.set_message("scanning headers");

    let records: Vec<(String, DepRecord)> = sources
        .par_iter()
        .map(|src| -> Result<(String, DepRecord)> {
            let record = scan_source(cc, src, cflags)?;
            pb.inc(1);
            Ok((src.clone(), record))
        })
        .collect::<Result<Vec<_>>>()?;
    pb.finish_and_clear();

    Ok(records.into_iter().collect())
}

/// Pull local header paths out of preprocessor line-marker output.
///
/// A marker path counts as local when it is not absolute (no leading
/// `/`), not a pseudo-file (`<built-in>`, `<command-line>`), and names
/// a header.
pub fn parse_line_markers(text: &str) -> Vec<String> {
    let marker = Regex::new(r#"^# \d+ "([^/<].*\.h)""#).unwrap();
    let mut headers = Vec::new();
    for line in text.lines() {
        if let Some(caps) = marker.captures(line) {
            headers.push(caps[1].to_string());
        }
    }
    headers
}

/// Pull `#include <...>` names out of source text.
pub fn parse_system_includes(text: &str) -> Vec<String> {
    let include = Regex::new(r"^#\s*include\s+<([^>]+)>").unwrap();
    let mut headers = Vec::new();
    for line in text.lines() {
        if let Some(caps) = include.captures(line) {
            headers.push(caps[1].to_string());
        }
    }
    headers
}

/// Read one file and append its angle-bracket includes. An unreadable
/// or non-UTF-8 file contributes nothing; the scan keeps going.
fn collect_system_includes(path: &str, into: &mut Vec<String>) {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(_) => return,
    };
    let text = match std::str::from_utf8(&bytes) {
        Ok(text) => text,
        Err(_) => {
            eprintln!(
                "{} invalid byte sequence in {}, skipping its includes",
                "!".yellow(),
                path
            );
            return;
        }
    };
    into.extend(parse_system_includes(text));
}
