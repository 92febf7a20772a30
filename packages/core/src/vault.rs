//! Remote LUKS vault operations.
//!
//! Drives the fixed administrative sequence on the remote host: unlock the
//! encrypted device, create a filesystem if none exists, mount it, normalize
//! permissions; and the reverse teardown (unmount, lock). Commands run
//! through any [`RemoteShell`], prefixed with `sudo -n` unless the profile
//! logs in as root.
//!
//! "Already unlocked" / "already mounted" style results are not errors here:
//! each operation returns an outcome enum and the condition is absorbed per
//! the disposition tables below, which match on exit codes first and fall
//! back to stderr indicators only where the tool gives nothing better.

use log::{info, warn};

use crate::error::{Error, Result};
use crate::profile::Profile;
use crate::ssh::RemoteShell;

/// What a non-zero exit from a remote command means for the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Surface as the operation's fatal error variant.
    Fatal,
    /// The requested state already holds; treat as success.
    Idempotent,
    /// Bad passphrase or credentials.
    AuthFailure,
    /// Device or mount held open elsewhere.
    Busy,
}

/// One row of a disposition table. `exit_code` matches the exact code;
/// `stderr_contains` matches a substring of the captured stderr. A row with
/// both set requires both to hold.
struct Rule {
    exit_code: Option<i32>,
    stderr_contains: Option<&'static str>,
    disposition: Disposition,
}

const fn rule(
    exit_code: Option<i32>,
    stderr_contains: Option<&'static str>,
    disposition: Disposition,
) -> Rule {
    Rule {
        exit_code,
        stderr_contains,
        disposition,
    }
}

/// cryptsetup exit codes: 2 = no permission (bad passphrase),
/// 5 = device already exists or device busy.
const UNLOCK_RULES: &[Rule] = &[
    rule(Some(2), None, Disposition::AuthFailure),
    rule(None, Some("No key available"), Disposition::AuthFailure),
    rule(None, Some("already exists"), Disposition::Idempotent),
    rule(None, Some("already in use"), Disposition::Idempotent),
    rule(Some(5), None, Disposition::Busy),
];

const MOUNT_RULES: &[Rule] = &[rule(None, Some("already mounted"), Disposition::Idempotent)];

const UNMOUNT_RULES: &[Rule] = &[
    rule(None, Some("target is busy"), Disposition::Busy),
    rule(None, Some("device is busy"), Disposition::Busy),
    rule(None, Some("not mounted"), Disposition::Idempotent),
];

const LOCK_RULES: &[Rule] = &[
    rule(None, Some("still in use"), Disposition::Busy),
    rule(Some(5), None, Disposition::Busy),
    rule(None, Some("not active"), Disposition::Idempotent),
    rule(None, Some("does not exist"), Disposition::Idempotent),
    rule(None, Some("doesn't exist"), Disposition::Idempotent),
];

/// blkid exits 2 when it finds no recognizable filesystem signature.
const BLKID_NO_FILESYSTEM: i32 = 2;

fn classify(rules: &[Rule], status: i32, stderr: &str) -> Disposition {
    for r in rules {
        let code_ok = r.exit_code.is_none_or(|c| c == status);
        let text_ok = r.stderr_contains.is_none_or(|s| stderr.contains(s));
        if code_ok && text_ok {
            return r.disposition;
        }
    }
    Disposition::Fatal
}

/// Result of [`RemoteVault::unlock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockOutcome {
    Unlocked,
    /// Mapper was already active, e.g. left over from a previous session.
    AlreadyUnlocked,
}

/// Result of [`RemoteVault::ensure_filesystem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilesystemOutcome {
    /// A filesystem signature was detected; nothing was touched.
    Present,
    /// The device was blank and a fresh ext4 filesystem was created.
    Created,
}

/// Result of [`RemoteVault::mount_remote`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountOutcome {
    Mounted,
    AlreadyMounted,
}

/// Executes the vault command sequence for one profile over a remote shell.
pub struct RemoteVault<'a, S: RemoteShell + ?Sized> {
    shell: &'a S,
    profile: &'a Profile,
}

impl<'a, S: RemoteShell + ?Sized> RemoteVault<'a, S> {
    pub fn new(shell: &'a S, profile: &'a Profile) -> Self {
        Self { shell, profile }
    }

    /// Opens the LUKS container, feeding the passphrase on stdin. The
    /// passphrase is passed exactly as given (no trailing newline: with
    /// `--key-file=-` cryptsetup takes every stdin byte as key material).
    pub fn unlock(&self, passphrase: &str) -> Result<UnlockOutcome> {
        let cmd = self.privileged(&format!(
            "cryptsetup luksOpen --key-file=- {} {}",
            self.profile.remote_device, self.profile.remote_mapper_name
        ));
        let out = self.shell.exec(&cmd, Some(passphrase.as_bytes()))?;

        if out.success() {
            info!("unlocked {} as {}", self.profile.remote_device, self.profile.remote_mapper_name);
            return Ok(UnlockOutcome::Unlocked);
        }

        match classify(UNLOCK_RULES, out.status, &out.stderr) {
            Disposition::Idempotent => {
                info!(
                    "mapper {} already active, reusing it",
                    self.profile.remote_mapper_name
                );
                Ok(UnlockOutcome::AlreadyUnlocked)
            }
            Disposition::AuthFailure => Err(Error::Auth {
                detail: format!("wrong passphrase for {}: {}", self.profile.remote_device, out.diagnostic()),
            }),
            Disposition::Busy => Err(Error::Busy {
                target: self.profile.mapper_path(),
                detail: out.diagnostic(),
            }),
            Disposition::Fatal => Err(Error::Unlock {
                device: self.profile.remote_device.clone(),
                mapper: self.profile.remote_mapper_name.clone(),
                code: out.status,
                stderr: out.diagnostic(),
            }),
        }
    }

    /// Creates an ext4 filesystem on the decrypted device ONLY when a probe
    /// proves none exists. Formatting is destructive, so anything short of
    /// blkid's unambiguous "no signature found" answer leaves the device
    /// untouched and fails instead.
    pub fn ensure_filesystem(&self) -> Result<FilesystemOutcome> {
        let mapper = self.profile.mapper_path();
        let probe = self
            .shell
            .exec(&self.privileged(&format!("blkid {mapper}")), None)?;

        if probe.success() {
            return Ok(FilesystemOutcome::Present);
        }
        if probe.status != BLKID_NO_FILESYSTEM || !probe.stderr.trim().is_empty() {
            return Err(Error::Format {
                device: mapper,
                code: probe.status,
                stderr: probe.diagnostic(),
            });
        }

        info!("no filesystem on {mapper}, creating ext4");
        let mkfs = self
            .shell
            .exec(&self.privileged(&format!("mkfs.ext4 -q {mapper}")), None)?;
        if mkfs.success() {
            Ok(FilesystemOutcome::Created)
        } else {
            Err(Error::Format {
                device: mapper,
                code: mkfs.status,
                stderr: mkfs.diagnostic(),
            })
        }
    }

    /// Mounts the decrypted device at the remote mount point.
    pub fn mount_remote(&self) -> Result<MountOutcome> {
        let mapper = self.profile.mapper_path();
        let mp = &self.profile.remote_mount_point;
        let cmd = format!(
            "{} && {}",
            self.privileged(&format!("mkdir -p {mp}")),
            self.privileged(&format!("mount {mapper} {mp}"))
        );
        let out = self.shell.exec(&cmd, None)?;

        if out.success() {
            info!("mounted {mapper} at {mp}");
            return Ok(MountOutcome::Mounted);
        }

        match classify(MOUNT_RULES, out.status, &out.stderr) {
            Disposition::Idempotent => {
                info!("{mapper} already mounted at {mp}");
                Ok(MountOutcome::AlreadyMounted)
            }
            Disposition::Busy => Err(Error::Busy {
                target: mp.clone(),
                detail: out.diagnostic(),
            }),
            _ => Err(Error::Mount {
                device: mapper,
                mount_point: mp.clone(),
                code: out.status,
                stderr: out.diagnostic(),
            }),
        }
    }

    /// Opens up the remote mount point so the connecting account can read
    /// and write. Best-effort: a failure is logged, never fatal.
    pub fn fix_permissions(&self) {
        let mp = &self.profile.remote_mount_point;
        match self
            .shell
            .exec(&self.privileged(&format!("chmod -R 777 {mp}")), None)
        {
            Ok(out) if out.success() => {}
            Ok(out) => warn!("could not normalize permissions on {mp}: {}", out.diagnostic()),
            Err(e) => warn!("could not normalize permissions on {mp}: {e}"),
        }
    }

    /// Unmounts the decrypted filesystem on the remote host.
    pub fn unmount_remote(&self) -> Result<()> {
        let mp = &self.profile.remote_mount_point;
        let out = self.shell.exec(&self.privileged(&format!("umount {mp}")), None)?;

        if out.success() {
            return Ok(());
        }

        match classify(UNMOUNT_RULES, out.status, &out.stderr) {
            Disposition::Idempotent => {
                info!("{mp} was not mounted");
                Ok(())
            }
            Disposition::Busy => Err(Error::Busy {
                target: mp.clone(),
                detail: out.diagnostic(),
            }),
            _ => Err(Error::Unmount {
                mount_point: mp.clone(),
                code: out.status,
                stderr: out.diagnostic(),
            }),
        }
    }

    /// Closes the LUKS container. Relies on cryptsetup's own busy detection
    /// when the device is still mounted; an already-closed mapper is treated
    /// as success.
    pub fn lock(&self) -> Result<()> {
        let mapper = &self.profile.remote_mapper_name;
        let out = self
            .shell
            .exec(&self.privileged(&format!("cryptsetup luksClose {mapper}")), None)?;

        if out.success() {
            info!("locked mapper {mapper}");
            return Ok(());
        }

        match classify(LOCK_RULES, out.status, &out.stderr) {
            Disposition::Idempotent => {
                info!("mapper {mapper} was not active");
                Ok(())
            }
            Disposition::Busy => Err(Error::Busy {
                target: self.profile.mapper_path(),
                detail: out.diagnostic(),
            }),
            _ => Err(Error::Lock {
                mapper: mapper.clone(),
                code: out.status,
                stderr: out.diagnostic(),
            }),
        }
    }

    fn privileged(&self, cmd: &str) -> String {
        if self.profile.needs_sudo() {
            format!("sudo -n {cmd}")
        } else {
            cmd.to_string()
        }
    }
}
