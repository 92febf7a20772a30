//! File-manager launch after a successful mount.
//!
//! Tries a fixed list of common file managers in order of preference and
//! detaches the first one that starts. Callers treat any error here as
//! informational only.

use std::path::Path;
use std::process::{Command, Stdio};

use log::info;

use crate::error::{Error, Result};

/// Candidates in order of preference; `xdg-open` last as the catch-all.
const FILE_MANAGERS: &[(&str, &str)] = &[
    ("thunar", "Thunar"),
    ("dolphin", "Dolphin"),
    ("nautilus", "Nautilus"),
    ("pcmanfm", "PCManFM"),
    ("nemo", "Nemo"),
    ("xdg-open", "the default file handler"),
];

/// Opens a file manager at `path`, detached from our stdio so it outlives
/// the session if the user wants it to.
pub fn open_file_manager(path: &Path) -> Result<()> {
    if std::env::var_os("DISPLAY").is_none() && std::env::var_os("WAYLAND_DISPLAY").is_none() {
        return Err(Error::Launch {
            detail: "no graphical session detected".to_string(),
        });
    }

    for (cmd, name) in FILE_MANAGERS {
        match Command::new(cmd)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(_) => {
                info!("opened {name} at {}", path.display());
                return Ok(());
            }
            Err(_) => continue,
        }
    }

    Err(Error::Launch {
        detail: "no supported file manager found".to_string(),
    })
}
