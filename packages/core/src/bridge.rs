//! Local mount bridge.
//!
//! Exposes the remote mounted directory at a local path via sshfs. The
//! [`Bridge`] trait is the orchestrator's seam; [`SshfsBridge`] is the real
//! implementation. A target that is already a mount point (from any source)
//! or a non-empty directory is rejected before sshfs is even spawned, which
//! also settles what happens when two profiles share a local mount point:
//! the second one fails fast.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

use log::info;

use crate::error::{Error, Result};
use crate::profile::{AuthMethod, Profile};

/// Result of [`Bridge::attach`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachOutcome {
    Attached,
    /// The same remote source was already attached here, e.g. by a previous
    /// run that never detached.
    AlreadyAttached,
}

/// Attaches and detaches the network filesystem at a local mount point.
pub trait Bridge {
    fn attach(&self, profile: &Profile) -> Result<AttachOutcome>;
    fn detach(&self, mount_point: &Path) -> Result<()>;
}

/// sshfs-backed [`Bridge`].
#[derive(Debug, Clone, Default)]
pub struct SshfsBridge;

impl SshfsBridge {
    pub fn new() -> Self {
        Self
    }
}

impl Bridge for SshfsBridge {
    fn attach(&self, profile: &Profile) -> Result<AttachOutcome> {
        let target = &profile.local_mount_point;
        let mounts = fs::read_to_string("/proc/mounts").map_err(|e| Error::Transport {
            mount_point: target.clone(),
            detail: format!("cannot read /proc/mounts: {e}"),
        })?;

        if let Some(outcome) = check_target(&mounts, target, &profile.sshfs_source())? {
            return Ok(outcome);
        }

        if target.exists() {
            if !target.is_dir() {
                return Err(Error::MountPointInUse {
                    path: target.clone(),
                    detail: "exists and is not a directory".to_string(),
                });
            }
            let occupied = fs::read_dir(target)
                .map_err(|e| Error::MountPointCreation {
                    path: target.clone(),
                    source: e,
                })?
                .next()
                .is_some();
            if occupied {
                return Err(Error::MountPointInUse {
                    path: target.clone(),
                    detail: "directory is not empty".to_string(),
                });
            }
        } else {
            fs::create_dir_all(target).map_err(|e| Error::MountPointCreation {
                path: target.clone(),
                source: e,
            })?;
        }

        let uid = nix::unistd::getuid().as_raw();
        let gid = nix::unistd::getgid().as_raw();
        let args = sshfs_args(profile, uid, gid);

        let mut child = Command::new("sshfs")
            .args(&args)
            .stdin(if profile.auth.password().is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::CommandSpawn {
                command: "sshfs".to_string(),
                source: e,
            })?;

        if let Some(password) = profile.auth.password() {
            if let Some(mut pipe) = child.stdin.take() {
                pipe.write_all(password.as_bytes())
                    .map_err(|e| Error::CommandSpawn {
                        command: "sshfs".to_string(),
                        source: e,
                    })?;
            }
        }

        let output = child.wait_with_output().map_err(|e| Error::CommandSpawn {
            command: "sshfs".to_string(),
            source: e,
        })?;

        if !output.status.success() {
            return Err(Error::Transport {
                mount_point: target.clone(),
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        info!(
            "attached {} at {}",
            profile.sshfs_source(),
            target.display()
        );
        Ok(AttachOutcome::Attached)
    }

    fn detach(&self, mount_point: &Path) -> Result<()> {
        let output = Command::new("fusermount")
            .arg("-u")
            .arg(mount_point)
            .output()
            .map_err(|e| Error::CommandSpawn {
                command: "fusermount -u".to_string(),
                source: e,
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        match classify_detach(output.status.code().unwrap_or(-1), &stderr) {
            DetachDisposition::Done => Ok(()),
            DetachDisposition::NotMounted => {
                info!("{} was not attached", mount_point.display());
                Ok(())
            }
            DetachDisposition::Busy => Err(Error::Busy {
                target: mount_point.display().to_string(),
                detail: stderr,
            }),
            DetachDisposition::Failed => Err(Error::Transport {
                mount_point: mount_point.to_path_buf(),
                detail: stderr,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DetachDisposition {
    Done,
    NotMounted,
    Busy,
    Failed,
}

fn classify_detach(status: i32, stderr: &str) -> DetachDisposition {
    if status == 0 {
        return DetachDisposition::Done;
    }
    if stderr.contains("busy") {
        return DetachDisposition::Busy;
    }
    if stderr.contains("not mounted") || stderr.contains("not found in") {
        return DetachDisposition::NotMounted;
    }
    DetachDisposition::Failed
}

/// Inspects the mount table for the target path. Returns
/// `Some(AlreadyAttached)` when our own source is already mounted there,
/// an error when something else is, `None` when the path is free.
fn check_target(
    mounts: &str,
    target: &Path,
    expected_source: &str,
) -> Result<Option<AttachOutcome>> {
    match mount_source_for(mounts, target) {
        Some(source) if source == expected_source => {
            info!("{} already attached at {}", source, target.display());
            Ok(Some(AttachOutcome::AlreadyAttached))
        }
        Some(source) => Err(Error::MountPointInUse {
            path: target.to_path_buf(),
            detail: format!("already mounted from {source}"),
        }),
        None => Ok(None),
    }
}

/// Finds the source mounted at `target`, if any.
fn mount_source_for(mounts: &str, target: &Path) -> Option<String> {
    for line in mounts.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let mut parts = line.split_whitespace();
        let source = parts.next()?;
        let mount_point = parts.next()?;
        if Path::new(&unescape_mount_field(mount_point)) == target {
            return Some(source.to_string());
        }
    }
    None
}

/// /proc/mounts escapes space, tab, newline and backslash as octal.
fn unescape_mount_field(input: &str) -> String {
    let mut chars = input.chars().peekable();
    let mut output = String::with_capacity(input.len());

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            output.push(ch);
            continue;
        }
        let mut oct = String::new();
        for _ in 0..3 {
            match chars.peek() {
                Some(c) if c.is_ascii_digit() => oct.push(chars.next().unwrap()),
                _ => break,
            }
        }
        match u8::from_str_radix(&oct, 8) {
            Ok(value) if oct.len() == 3 => output.push(value as char),
            _ => {
                output.push('\\');
                output.push_str(&oct);
            }
        }
    }

    output
}

/// Argument list for the sshfs invocation.
fn sshfs_args(profile: &Profile, uid: u32, gid: u32) -> Vec<String> {
    let mut args = vec![
        "-p".to_string(),
        profile.port.to_string(),
        "-o".to_string(),
        "reconnect".to_string(),
        "-o".to_string(),
        "ServerAliveInterval=20".to_string(),
        "-o".to_string(),
        "ServerAliveCountMax=5".to_string(),
        "-o".to_string(),
        "ConnectTimeout=20".to_string(),
        "-o".to_string(),
        format!("uid={uid}"),
        "-o".to_string(),
        format!("gid={gid}"),
    ];
    if matches!(profile.auth, AuthMethod::InsecurePassword { .. }) {
        args.push("-o".to_string());
        args.push("password_stdin".to_string());
    }
    args.push(profile.sshfs_source());
    args.push(profile.local_mount_point.display().to_string());
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn profile() -> Profile {
        Profile {
            name: "vault1".to_string(),
            host: "203.0.113.7".to_string(),
            port: 22,
            username: "admin".to_string(),
            auth: AuthMethod::KeyBased,
            remote_device: "/dev/sdb1".to_string(),
            remote_mapper_name: "vault1map".to_string(),
            remote_mount_point: "/mnt/encrypted".to_string(),
            local_mount_point: PathBuf::from("/home/user/.LUKS-VAULT/mnt/vault1"),
        }
    }

    #[test]
    fn test_mount_source_found() {
        let mounts = "admin@203.0.113.7:/mnt/encrypted /home/user/.LUKS-VAULT/mnt/vault1 fuse.sshfs rw 0 0\n";
        assert_eq!(
            mount_source_for(mounts, Path::new("/home/user/.LUKS-VAULT/mnt/vault1")),
            Some("admin@203.0.113.7:/mnt/encrypted".to_string())
        );
        assert_eq!(mount_source_for(mounts, Path::new("/elsewhere")), None);
    }

    #[test]
    fn test_mount_source_unescapes_octal() {
        let mounts = "/dev/sdb1 /media/MY\\040VAULT ext4 rw 0 0\n";
        assert_eq!(
            mount_source_for(mounts, Path::new("/media/MY VAULT")),
            Some("/dev/sdb1".to_string())
        );
    }

    #[test]
    fn test_check_target_same_source_is_already_attached() {
        let p = profile();
        let mounts = format!(
            "{} {} fuse.sshfs rw 0 0\n",
            p.sshfs_source(),
            p.local_mount_point.display()
        );
        let outcome = check_target(&mounts, &p.local_mount_point, &p.sshfs_source()).unwrap();
        assert_eq!(outcome, Some(AttachOutcome::AlreadyAttached));
    }

    #[test]
    fn test_check_target_foreign_source_is_rejected() {
        let p = profile();
        let mounts = format!(
            "other@host:/data {} fuse.sshfs rw 0 0\n",
            p.local_mount_point.display()
        );
        let err = check_target(&mounts, &p.local_mount_point, &p.sshfs_source()).unwrap_err();
        assert!(matches!(err, Error::MountPointInUse { .. }));
    }

    #[test]
    fn test_check_target_free_path() {
        let p = profile();
        assert_eq!(
            check_target("", &p.local_mount_point, &p.sshfs_source()).unwrap(),
            None
        );
    }

    #[test]
    fn test_sshfs_args_key_based() {
        let args = sshfs_args(&profile(), 1000, 1000);
        assert!(args.contains(&"reconnect".to_string()));
        assert!(args.contains(&"uid=1000".to_string()));
        assert!(!args.contains(&"password_stdin".to_string()));
        assert_eq!(
            args[args.len() - 2..],
            [
                "admin@203.0.113.7:/mnt/encrypted".to_string(),
                "/home/user/.LUKS-VAULT/mnt/vault1".to_string()
            ]
        );
    }

    #[test]
    fn test_sshfs_args_password_mode() {
        let mut p = profile();
        p.auth = AuthMethod::InsecurePassword {
            password: "hunter2".to_string(),
        };
        let args = sshfs_args(&p, 1000, 1000);
        assert!(args.contains(&"password_stdin".to_string()));
        // The password itself travels over stdin, never in argv.
        assert!(!args.iter().any(|a| a.contains("hunter2")));
    }

    #[test]
    fn test_classify_detach() {
        assert_eq!(classify_detach(0, ""), DetachDisposition::Done);
        assert_eq!(
            classify_detach(1, "fusermount: failed to unmount /x: Device or resource busy"),
            DetachDisposition::Busy
        );
        assert_eq!(
            classify_detach(1, "fusermount: entry for /x not found in /etc/mtab"),
            DetachDisposition::NotMounted
        );
        assert_eq!(
            classify_detach(1, "fusermount: unknown failure"),
            DetachDisposition::Failed
        );
    }

    #[test]
    fn test_attach_rejects_non_empty_mount_point() {
        let dir = tempdir().unwrap();
        let mut p = profile();
        p.local_mount_point = dir.path().join("mnt");
        fs::create_dir_all(&p.local_mount_point).unwrap();
        fs::write(p.local_mount_point.join("leftover"), b"x").unwrap();

        let err = SshfsBridge::new().attach(&p).unwrap_err();
        assert!(matches!(err, Error::MountPointInUse { .. }));
    }
}
