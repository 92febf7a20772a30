//! Session orchestration.
//!
//! Sequences the remote executor and the local bridge into the connect and
//! disconnect workflows. Connect rolls back completed steps on any fatal
//! failure so a local error never strands the remote side unlocked;
//! disconnect attempts every teardown step regardless of earlier failures
//! and reports them all at once.

use std::io;

use log::{info, warn};

use crate::bridge::Bridge;
use crate::error::{Error, Result};
use crate::launcher;
use crate::profile::Profile;
use crate::ssh::RemoteShell;
use crate::vault::{RemoteVault, UnlockOutcome};

/// Runtime state of one connect/disconnect cycle. Never persisted; a crash
/// mid-session leaves remote/local mounts for the recovery commands.
#[derive(Debug)]
pub struct Session {
    profile: Profile,
    remote_unlocked: bool,
    remote_mounted: bool,
    bridged: bool,
}

impl Session {
    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn is_bridged(&self) -> bool {
        self.bridged
    }
}

/// One step of the teardown sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownStep {
    Detach,
    UnmountRemote,
    Lock,
}

impl TeardownStep {
    pub fn name(&self) -> &'static str {
        match self {
            TeardownStep::Detach => "detach",
            TeardownStep::UnmountRemote => "unmount_remote",
            TeardownStep::Lock => "lock",
        }
    }
}

/// Aggregated outcome of a disconnect: every step, attempted in order.
#[derive(Debug)]
pub struct TeardownReport {
    steps: Vec<(TeardownStep, Result<()>)>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.steps.iter().all(|(_, r)| r.is_ok())
    }

    /// Steps that failed, with their errors, in execution order.
    pub fn failures(&self) -> impl Iterator<Item = (TeardownStep, &Error)> {
        self.steps
            .iter()
            .filter_map(|(step, r)| r.as_ref().err().map(|e| (*step, e)))
    }

    pub fn steps(&self) -> &[(TeardownStep, Result<()>)] {
        &self.steps
    }
}

/// Drives connect/disconnect for one profile over pluggable transports.
pub struct Orchestrator<'a, S: RemoteShell + ?Sized, B: Bridge + ?Sized> {
    shell: &'a S,
    bridge: &'a B,
    launch_file_manager: bool,
}

impl<'a, S: RemoteShell + ?Sized, B: Bridge + ?Sized> Orchestrator<'a, S, B> {
    pub fn new(shell: &'a S, bridge: &'a B) -> Self {
        Self {
            shell,
            bridge,
            launch_file_manager: false,
        }
    }

    /// Also launch a file manager at the local mount point after a
    /// successful connect. Launch failures are logged, never fatal: a
    /// missing GUI must not block access to the files.
    pub fn with_file_manager(mut self) -> Self {
        self.launch_file_manager = true;
        self
    }

    /// Runs the full connect sequence: unlock, filesystem check, remote
    /// mount, permission fix, local attach, optional file-manager launch.
    ///
    /// On fatal failure, already-completed steps are rolled back in reverse
    /// (best-effort) before the error is returned.
    pub fn connect(&self, profile: &Profile, passphrase: &str) -> Result<Session> {
        let vault = RemoteVault::new(self.shell, profile);

        let unlock_outcome = vault
            .unlock(passphrase)
            .map_err(|e| self.fail(profile, "unlock", e, false, false))?;

        // A mapper left active by a previous session already carries a
        // filesystem; skip the probe on reconnect.
        if unlock_outcome == UnlockOutcome::Unlocked {
            vault
                .ensure_filesystem()
                .map_err(|e| self.fail(profile, "ensure_filesystem", e, true, false))?;
        }

        vault
            .mount_remote()
            .map_err(|e| self.fail(profile, "mount_remote", e, true, false))?;

        vault.fix_permissions();

        self.bridge
            .attach(profile)
            .map_err(|e| self.fail(profile, "attach", e, true, true))?;

        if self.launch_file_manager {
            if let Err(e) = launcher::open_file_manager(&profile.local_mount_point) {
                warn!("file manager launch skipped: {e}");
            }
        }

        info!(
            "session active: {} at {}",
            profile.name,
            profile.local_mount_point.display()
        );
        Ok(Session {
            profile: profile.clone(),
            remote_unlocked: true,
            remote_mounted: true,
            bridged: true,
        })
    }

    /// Tears the session down: detach the local bridge, unmount the remote
    /// filesystem, lock the container. Every step is attempted even when an
    /// earlier one fails; the report lists each step's outcome.
    pub fn disconnect(&self, session: Session) -> TeardownReport {
        let vault = RemoteVault::new(self.shell, &session.profile);
        let mut steps = Vec::new();

        let detach = if session.bridged {
            self.bridge.detach(&session.profile.local_mount_point)
        } else {
            Ok(())
        };
        steps.push((TeardownStep::Detach, detach));

        let unmount = if session.remote_mounted {
            vault.unmount_remote()
        } else {
            Ok(())
        };
        steps.push((TeardownStep::UnmountRemote, unmount));

        let lock = if session.remote_unlocked {
            vault.lock()
        } else {
            Ok(())
        };
        steps.push((TeardownStep::Lock, lock));

        TeardownReport { steps }
    }

    /// Rolls back completed steps and wraps the cause into a connect error.
    fn fail(
        &self,
        profile: &Profile,
        step: &str,
        cause: Error,
        unlocked: bool,
        mounted: bool,
    ) -> Error {
        let mut rollback = Vec::new();
        let vault = RemoteVault::new(self.shell, profile);

        if mounted {
            match vault.unmount_remote() {
                Ok(()) => rollback.push(format!(
                    "unmounted {} on remote host",
                    profile.remote_mount_point
                )),
                Err(e) => rollback.push(format!(
                    "FAILED to unmount {}: {e}",
                    profile.remote_mount_point
                )),
            }
        }
        if unlocked {
            match vault.lock() {
                Ok(()) => rollback.push(format!("locked mapper {}", profile.remote_mapper_name)),
                Err(e) => rollback.push(format!(
                    "FAILED to lock mapper {}: {e}",
                    profile.remote_mapper_name
                )),
            }
        }

        Error::Connect {
            step: step.to_string(),
            source: Box::new(cause),
            rollback,
        }
    }
}

/// Blocks until the user signals the end of the session by pressing Enter.
/// The sole long-lived wait point in the tool.
pub fn wait_for_exit_signal() -> io::Result<()> {
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::AttachOutcome;
    use crate::profile::AuthMethod;
    use crate::ssh::ExecOutput;
    use std::cell::RefCell;
    use std::path::{Path, PathBuf};

    struct FakeShell {
        responses: Vec<(&'static str, ExecOutput)>,
        log: RefCell<Vec<String>>,
    }

    impl FakeShell {
        fn new(responses: Vec<(&'static str, ExecOutput)>) -> Self {
            Self {
                responses,
                log: RefCell::new(Vec::new()),
            }
        }

        fn commands(&self) -> Vec<String> {
            self.log.borrow().clone()
        }
    }

    impl RemoteShell for FakeShell {
        fn exec(&self, command: &str, _stdin: Option<&[u8]>) -> Result<ExecOutput> {
            self.log.borrow_mut().push(command.to_string());
            for (needle, out) in &self.responses {
                if command.contains(needle) {
                    return Ok(out.clone());
                }
            }
            Ok(ExecOutput {
                status: 0,
                stdout: String::new(),
                stderr: String::new(),
            })
        }
    }

    struct FakeBridge {
        attach_result: RefCell<Option<Error>>,
        detach_result: RefCell<Option<Error>>,
        log: RefCell<Vec<String>>,
    }

    impl FakeBridge {
        fn ok() -> Self {
            Self {
                attach_result: RefCell::new(None),
                detach_result: RefCell::new(None),
                log: RefCell::new(Vec::new()),
            }
        }

        fn failing_attach(error: Error) -> Self {
            let bridge = Self::ok();
            *bridge.attach_result.borrow_mut() = Some(error);
            bridge
        }

        fn failing_detach(error: Error) -> Self {
            let bridge = Self::ok();
            *bridge.detach_result.borrow_mut() = Some(error);
            bridge
        }

        fn calls(&self) -> Vec<String> {
            self.log.borrow().clone()
        }
    }

    impl Bridge for FakeBridge {
        fn attach(&self, profile: &Profile) -> Result<AttachOutcome> {
            self.log.borrow_mut().push("attach".to_string());
            match self.attach_result.borrow_mut().take() {
                Some(e) => Err(e),
                None => {
                    let _ = profile;
                    Ok(AttachOutcome::Attached)
                }
            }
        }

        fn detach(&self, mount_point: &Path) -> Result<()> {
            self.log.borrow_mut().push("detach".to_string());
            let _ = mount_point;
            match self.detach_result.borrow_mut().take() {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }
    }

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

    fn fail(status: i32, stderr: &str) -> ExecOutput {
        ExecOutput {
            status,
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }

    #[test]
    fn test_connect_issues_steps_in_order() {
        let shell = FakeShell::new(vec![]);
        let bridge = FakeBridge::ok();
        let orchestrator = Orchestrator::new(&shell, &bridge);

        let session = orchestrator.connect(&profile(), "s3cret").unwrap();
        assert!(session.is_bridged());

        let commands = shell.commands();
        assert!(commands[0].contains("cryptsetup luksOpen --key-file=- /dev/sdb1 vault1map"));
        assert!(commands[1].contains("blkid /dev/mapper/vault1map"));
        assert!(commands[2].contains("mount /dev/mapper/vault1map /mnt/encrypted"));
        assert!(commands[3].contains("chmod -R 777 /mnt/encrypted"));
        assert_eq!(bridge.calls(), vec!["attach"]);
    }

    #[test]
    fn test_idempotent_reconnect_skips_filesystem_probe() {
        let shell = FakeShell::new(vec![
            ("luksOpen", fail(5, "Device vault1map already exists.")),
            (
                "mount /dev/mapper",
                fail(32, "mount: /dev/mapper/vault1map is already mounted on /mnt/encrypted."),
            ),
        ]);
        let bridge = FakeBridge::ok();
        let orchestrator = Orchestrator::new(&shell, &bridge);

        orchestrator.connect(&profile(), "s3cret").unwrap();

        let commands = shell.commands();
        assert!(!commands.iter().any(|c| c.contains("blkid")));
        assert!(!commands.iter().any(|c| c.contains("mkfs")));
    }

    #[test]
    fn test_auth_failure_rolls_back_nothing() {
        let shell = FakeShell::new(vec![(
            "luksOpen",
            fail(2, "No key available with this passphrase."),
        )]);
        let bridge = FakeBridge::ok();
        let orchestrator = Orchestrator::new(&shell, &bridge);

        let err = orchestrator.connect(&profile(), "wrong").unwrap_err();
        match err {
            Error::Connect {
                step,
                source,
                rollback,
            } => {
                assert_eq!(step, "unlock");
                assert!(source.is_auth());
                assert!(rollback.is_empty());
            }
            other => panic!("expected Connect error, got {other:?}"),
        }
        // Nothing local was touched.
        assert!(bridge.calls().is_empty());
        assert_eq!(shell.commands().len(), 1);
    }

    #[test]
    fn test_bridge_failure_unmounts_and_locks_remote() {
        let shell = FakeShell::new(vec![]);
        let bridge = FakeBridge::failing_attach(Error::Transport {
            mount_point: PathBuf::from("/home/user/.LUKS-VAULT/mnt/vault1"),
            detail: "read: Connection reset by peer".to_string(),
        });
        let orchestrator = Orchestrator::new(&shell, &bridge);

        let err = orchestrator.connect(&profile(), "s3cret").unwrap_err();
        match err {
            Error::Connect { step, rollback, .. } => {
                assert_eq!(step, "attach");
                assert_eq!(rollback.len(), 2);
                assert!(rollback[0].contains("unmounted /mnt/encrypted"));
                assert!(rollback[1].contains("locked mapper vault1map"));
            }
            other => panic!("expected Connect error, got {other:?}"),
        }

        let commands = shell.commands();
        assert!(commands.iter().any(|c| c.contains("umount /mnt/encrypted")));
        assert!(commands.iter().any(|c| c.contains("cryptsetup luksClose vault1map")));
    }

    #[test]
    fn test_disconnect_order_and_clean_report() {
        let shell = FakeShell::new(vec![]);
        let bridge = FakeBridge::ok();
        let orchestrator = Orchestrator::new(&shell, &bridge);

        let session = orchestrator.connect(&profile(), "s3cret").unwrap();
        shell.log.borrow_mut().clear();

        let report = orchestrator.disconnect(session);
        assert!(report.is_clean());
        assert_eq!(report.steps().len(), 3);

        // detach first, then remote unmount, then lock.
        assert_eq!(bridge.calls(), vec!["attach", "detach"]);
        let commands = shell.commands();
        assert!(commands[0].contains("umount /mnt/encrypted"));
        assert!(commands[1].contains("cryptsetup luksClose vault1map"));
    }

    #[test]
    fn test_disconnect_busy_detach_still_runs_remote_teardown() {
        let shell = FakeShell::new(vec![]);
        let bridge = FakeBridge::failing_detach(Error::Busy {
            target: "/home/user/.LUKS-VAULT/mnt/vault1".to_string(),
            detail: "Device or resource busy".to_string(),
        });
        let orchestrator = Orchestrator::new(&shell, &bridge);

        let session = orchestrator.connect(&profile(), "s3cret").unwrap();
        shell.log.borrow_mut().clear();

        let report = orchestrator.disconnect(session);
        assert!(!report.is_clean());

        let failed: Vec<_> = report.failures().collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].0, TeardownStep::Detach);
        assert!(failed[0].1.is_busy());

        // Remote unmount and lock were still attempted.
        let commands = shell.commands();
        assert!(commands.iter().any(|c| c.contains("umount /mnt/encrypted")));
        assert!(commands.iter().any(|c| c.contains("cryptsetup luksClose vault1map")));
    }
}
