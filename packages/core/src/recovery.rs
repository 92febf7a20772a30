//! Manual-recovery commands for orphaned state.
//!
//! When a step fails or the process dies mid-sequence, the operator needs a
//! copy-pasteable way out. This is a fixed table keyed by the failing step,
//! not advice generated from error text.

use crate::error::Error;
use crate::profile::Profile;

/// One manual-recovery command for a failed step, ready to print.
///
/// Busy failures on the local bridge get the holder-listing command instead
/// of a force-unmount, so the operator can close the offender rather than
/// rip the mount away from it.
pub fn recovery_hint(step: &str, error: &Error, profile: &Profile) -> String {
    let local = profile.local_mount_point.display();
    let dest = profile.ssh_destination();

    match step {
        "attach" | "detach" => {
            if error.is_busy() {
                format!("lsof +D {local}")
            } else {
                format!("fusermount -uz {local}")
            }
        }
        "unmount_remote" => format!(
            "ssh {dest} 'sudo umount -f {}'",
            profile.remote_mount_point
        ),
        "lock" | "unlock" | "ensure_filesystem" | "mount_remote" => format!(
            "ssh {dest} 'sudo cryptsetup luksClose {} || sudo dmsetup remove {}'",
            profile.remote_mapper_name, profile.remote_mapper_name
        ),
        _ => format!("fusermount -uz {local}"),
    }
}
