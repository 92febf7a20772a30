//! remote-vault-core: Core library for remote LUKS vault sessions.
//!
//! This library orchestrates mounting a remotely-hosted LUKS-encrypted
//! volume onto a local path: unlock and mount over SSH, attach the result
//! locally via sshfs, and tear everything down in reverse.
//!
//! # Modules
//!
//! - [`profile`]: Connection profile data model
//! - [`store`]: Profile persistence (one JSON file per profile)
//! - [`ssh`]: Remote shell transport ([`ssh::RemoteShell`] + ssh/sshpass)
//! - [`vault`]: Remote unlock/format/mount/teardown with disposition tables
//! - [`bridge`]: Local sshfs attach/detach
//! - [`session`]: Connect/disconnect orchestration with rollback
//! - [`launcher`]: Optional file-manager launch
//! - [`recovery`]: Manual-recovery command table
//! - [`deps`]: Local tool preflight
//! - [`error`]: Error types
//!
//! # Example
//!
//! ```no_run
//! use remote_vault_core::{Orchestrator, ProfileStore, SshTransport, SshfsBridge};
//!
//! let store = ProfileStore::open_default().unwrap();
//! let profile = store.load_profile("vault1").unwrap();
//!
//! let shell = SshTransport::from_profile(&profile);
//! let bridge = SshfsBridge::new();
//! let orchestrator = Orchestrator::new(&shell, &bridge).with_file_manager();
//!
//! let session = orchestrator.connect(&profile, "passphrase").unwrap();
//! remote_vault_core::session::wait_for_exit_signal().unwrap();
//! let report = orchestrator.disconnect(session);
//! assert!(report.is_clean());
//! ```

pub mod bridge;
pub mod deps;
pub mod error;
pub mod launcher;
pub mod profile;
pub mod recovery;
pub mod session;
pub mod ssh;
pub mod store;
pub mod vault;

// Re-export commonly used types
pub use bridge::{AttachOutcome, Bridge, SshfsBridge};
pub use error::{Error, Result};
pub use profile::{AuthMethod, Profile};
pub use session::{Orchestrator, Session, TeardownReport, TeardownStep};
pub use ssh::{ExecOutput, RemoteShell, SshTransport};
pub use store::ProfileStore;
pub use vault::{FilesystemOutcome, MountOutcome, RemoteVault, UnlockOutcome};
