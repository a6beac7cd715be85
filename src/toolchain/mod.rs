//! Toolchain resolution and command synthesis.
//!
//! Resolution order for the C compiler: the `CC` environment override,
//! then a search list of conventional executable names, then the forced
//! MSVC spelling on the Windows family. The resolved executable is
//! verified to be invocable before anything else runs; a mandatory
//! compiler that cannot be found or run aborts the whole generation.
//!
//! Vendor quirks (output-flag spelling, unsupported warning flags) are
//! decided by the resolved executable's *file name*, never by an OS
//! check, so cross builds behave the same as native ones.

pub mod compiler;
pub mod linker;

pub use compiler::{CompileStep, Compiler};
pub use linker::LinkStep;

use crate::platform::{SystemType, TargetOs};

/// Compiler vendors with distinct command-line conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vendor {
    /// GCC, Clang, and anything else speaking `-c -o`.
    Gnu,
    /// Microsoft CL.EXE and its `/Fo` spelling.
    Microsoft,
}

impl Vendor {
    /// Classify a compiler by the file name of its executable.
    pub fn from_executable(path: &str) -> Vendor {
        let name = path
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(path)
            .to_lowercase();
        if name == "cl.exe" || name == "cl" {
            Vendor::Microsoft
        } else {
            Vendor::Gnu
        }
    }
}

/// Everything the synthesizer needs to know about the environment,
/// gathered once at startup. No other module reads process environment
/// or sniffs the host OS to make toolchain decisions.
#[derive(Debug, Clone)]
pub struct ToolchainContext {
    pub system: SystemType,
    pub target_os: TargetOs,
    pub cc_override: Option<String>,
}

impl ToolchainContext {
    pub fn new(system: SystemType) -> anyhow::Result<ToolchainContext> {
        let target_os = system.target_os()?;
        Ok(ToolchainContext {
            system,
            target_os,
            cc_override: std::env::var("CC").ok().filter(|s| !s.is_empty()),
        })
    }

    /// A fixed context for tests: native-independent, no env reads.
    pub fn fixed(target_os: TargetOs) -> ToolchainContext {
        ToolchainContext {
            system: SystemType::default(),
            target_os,
            cc_override: None,
        }
    }
}
