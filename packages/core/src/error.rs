//! Unified error types for the remote-vault-core library.
//!
//! Uses SNAFU for context-rich error handling, especially useful when the same
//! underlying error type (like `std::io::Error`) appears in different contexts.

use snafu::Snafu;
use std::path::PathBuf;

/// Result type alias using the library's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for all core library operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Failed to spawn a local process (ssh, sshfs, fusermount, ...).
    #[snafu(display("failed to execute command '{command}'"))]
    CommandSpawn {
        command: String,
        source: std::io::Error,
    },

    /// Remote host rejected the supplied credentials or passphrase.
    #[snafu(display("authentication failed: {detail}"))]
    Auth { detail: String },

    /// Remote host unreachable or the SSH session dropped.
    #[snafu(display("cannot reach {host}:{port}: {detail}"))]
    Connection {
        host: String,
        port: u16,
        detail: String,
    },

    /// Device or mount point is held open by another process.
    #[snafu(display("{target} is busy: {detail}"))]
    Busy { target: String, detail: String },

    /// Filesystem probe or creation on the decrypted device failed.
    #[snafu(display("filesystem check on {device} failed (exit {code}): {stderr}"))]
    Format {
        device: String,
        code: i32,
        stderr: String,
    },

    /// Remote mount failed.
    #[snafu(display("failed to mount {device} at {mount_point} (exit {code}): {stderr}"))]
    Mount {
        device: String,
        mount_point: String,
        code: i32,
        stderr: String,
    },

    /// Remote unmount failed.
    #[snafu(display("failed to unmount {mount_point} (exit {code}): {stderr}"))]
    Unmount {
        mount_point: String,
        code: i32,
        stderr: String,
    },

    /// Remote lock (cryptsetup close) failed.
    #[snafu(display("failed to lock mapper '{mapper}' (exit {code}): {stderr}"))]
    Lock {
        mapper: String,
        code: i32,
        stderr: String,
    },

    /// Remote unlock (cryptsetup open) failed for a reason other than auth.
    #[snafu(display("failed to unlock {device} as '{mapper}' (exit {code}): {stderr}"))]
    Unlock {
        device: String,
        mapper: String,
        code: i32,
        stderr: String,
    },

    /// Local network-filesystem attach/detach failed.
    #[snafu(display("sshfs transport error at {}: {detail}", mount_point.display()))]
    Transport {
        mount_point: PathBuf,
        detail: String,
    },

    /// Local mount point is already a mount or contains files.
    #[snafu(display("local mount point {} is in use: {detail}", path.display()))]
    MountPointInUse { path: PathBuf, detail: String },

    /// Mount point creation failed.
    #[snafu(display("failed to create mount point at {}", path.display()))]
    MountPointCreation {
        path: PathBuf,
        source: std::io::Error,
    },

    /// No stored profile with the requested name.
    #[snafu(display("no profile named '{name}'"))]
    NotFound { name: String },

    /// Stored profile file is malformed or missing required fields.
    #[snafu(display("failed to parse profile at {}: {detail}", path.display()))]
    Parse { path: PathBuf, detail: String },

    /// Filesystem error while touching the profile store.
    #[snafu(display("profile store I/O error at {}", path.display()))]
    StoreIo {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Home directory not found.
    #[snafu(display("could not determine home directory"))]
    HomeDirNotFound,

    /// No usable file manager could be launched.
    #[snafu(display("could not launch a file manager: {detail}"))]
    Launch { detail: String },

    /// Required local tools are not installed.
    #[snafu(display("missing required dependencies: {}", tools.join(", ")))]
    MissingDependency { tools: Vec<String> },

    /// Connect sequence failed; wraps the first fatal cause plus the outcome
    /// of the best-effort rollback of already-completed steps.
    #[snafu(display("connect failed at step '{step}': {source}"))]
    Connect {
        step: String,
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
        rollback: Vec<String>,
    },
}

impl Error {
    /// Returns true for credential/passphrase rejections.
    pub fn is_auth(&self) -> bool {
        matches!(self, Error::Auth { .. })
    }

    /// Returns true when the underlying cause is a busy device or mount.
    pub fn is_busy(&self) -> bool {
        matches!(self, Error::Busy { .. })
    }
}
