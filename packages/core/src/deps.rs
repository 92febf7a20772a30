//! Local dependency preflight.
//!
//! The tool shells out to ssh, sshfs and fusermount (plus sshpass for
//! stored-password profiles). Checking up front gives one readable report
//! instead of a confusing failure three steps into a connect.

use std::process::{Command, Stdio};

use crate::error::{Error, Result};

/// Tools every session needs, with a cheap probe argument for each.
const REQUIRED_TOOLS: &[(&str, &str)] = &[
    ("ssh", "-V"),
    ("sshfs", "--version"),
    ("fusermount", "-V"),
];

const SSHPASS: (&str, &str) = ("sshpass", "-V");

/// Verifies the required local tools exist. `need_sshpass` is true when a
/// stored-password profile is about to be used.
pub fn check_dependencies(need_sshpass: bool) -> Result<()> {
    let mut tools: Vec<(&str, &str)> = REQUIRED_TOOLS.to_vec();
    if need_sshpass {
        tools.push(SSHPASS);
    }

    let missing: Vec<String> = tools
        .iter()
        .filter(|(tool, probe)| !tool_available(tool, probe))
        .map(|(tool, _)| tool.to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::MissingDependency { tools: missing })
    }
}

/// Per-distro install advice printed alongside a missing-dependency error.
pub fn install_hint() -> &'static str {
    "To install on Debian/Ubuntu: sudo apt install sshfs sshpass\n\
     To install on Arch: sudo pacman -S sshfs sshpass\n\
     To install on Fedora: sudo dnf install fuse-sshfs sshpass"
}

/// A tool counts as available when it can be spawned at all; only a
/// NotFound spawn error marks it missing.
fn tool_available(tool: &str, probe_arg: &str) -> bool {
    match Command::new(tool)
        .arg(probe_arg)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
    {
        Ok(_) => true,
        Err(e) => e.kind() != std::io::ErrorKind::NotFound,
    }
}
