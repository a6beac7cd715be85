//! # makegen - Makefile Generator for C Projects
//!
//! makegen reads a declarative `project.toml` manifest and synthesizes a
//! platform-correct, incremental `Makefile` plus a `config.h` feature
//! header.
//!
//! ## Features
//!
//! - **Declarative Manifests**: binaries, libraries, headers, manual
//!   pages, scripts, tests, and external sub-projects in one TOML file
//! - **Automatic Header Dependencies**: the toolchain preprocessor is
//!   consulted so editing a header rebuilds exactly the objects that
//!   include it
//! - **Cross-Toolchain**: GCC/Clang and MSVC command conventions, ELF
//!   and Solaris rpath spellings, ABI-versioned shared-object naming
//! - **Feature Probes**: header, declaration, and function availability
//!   checks written into `config.h`
//!
//! ## Quick Start
//!
//! ```bash
//! # Create a starter manifest
//! mg init
//!
//! # Generate Makefile and config.h
//! mg configure
//! ```
//!
//! ## Module Organization
//!
//! - [`project`] - Configure-time orchestration
//! - [`makefile`] - The mergeable build graph and its serialization
//! - [`toolchain`] - Compiler resolution and command synthesis
//! - [`depscan`] - Header dependency discovery
//! - [`buildable`] - Build-product variants and graph expansion

/// Buildable products and their expansion into graph fragments.
pub mod buildable;

/// Header dependency discovery via the preprocessor.
pub mod depscan;

/// Installation path configuration.
pub mod installer;

/// The build graph: targets, rules, variables, serialization.
pub mod makefile;

/// Manifest parsing (`project.toml`).
pub mod manifest;

/// Platform facts: extensions, archiver, shell command spellings.
pub mod platform;

/// Feature probes and `config.h` generation.
pub mod probe;

/// Configure-time orchestration.
pub mod project;

/// Toolchain resolution and command synthesis.
pub mod toolchain;
