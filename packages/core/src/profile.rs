//! Connection profile definitions.
//!
//! A profile names one remote LUKS vault: where to reach it, how to
//! authenticate, which block device to unlock, and where the decrypted
//! filesystem surfaces on both hosts.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default SSH port.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Default device-mapper name assigned to the decrypted device.
pub const DEFAULT_MAPPER_NAME: &str = "encrypted_vault";

/// Default mount point for the decrypted filesystem on the remote host.
pub const DEFAULT_REMOTE_MOUNT_POINT: &str = "/mnt/encrypted";

fn default_port() -> u16 {
    DEFAULT_SSH_PORT
}

/// How the SSH transport authenticates against the remote host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// Key-based authentication (ssh agent or identity files). Preferred;
    /// nothing secret is persisted.
    KeyBased,
    /// Plaintext password stored in the profile file. Explicit opt-in only;
    /// the name is deliberately ugly so nobody picks it by accident.
    InsecurePassword { password: String },
}

impl AuthMethod {
    /// Returns the stored password, if this profile opted into storing one.
    pub fn password(&self) -> Option<&str> {
        match self {
            AuthMethod::KeyBased => None,
            AuthMethod::InsecurePassword { password } => Some(password),
        }
    }
}

/// One saved remote vault: connection target plus volume parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Unique human-chosen identifier; doubles as the store filename.
    pub name: String,
    /// Remote hostname or IP.
    pub host: String,
    /// SSH port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Remote account name.
    pub username: String,
    /// Authentication mode.
    pub auth: AuthMethod,
    /// Encrypted block device on the remote host (e.g. /dev/sdb1).
    pub remote_device: String,
    /// Name assigned to the decrypted device-mapper entry.
    pub remote_mapper_name: String,
    /// Where the decrypted filesystem is mounted on the remote host.
    pub remote_mount_point: String,
    /// Where the remote filesystem is attached locally.
    pub local_mount_point: PathBuf,
}

impl Profile {
    /// SSH destination in `user@host` form.
    pub fn ssh_destination(&self) -> String {
        format!("{}@{}", self.username, self.host)
    }

    /// Path of the decrypted device-mapper node on the remote host.
    pub fn mapper_path(&self) -> String {
        format!("/dev/mapper/{}", self.remote_mapper_name)
    }

    /// Source argument handed to sshfs: `user@host:remote_mount_point`.
    pub fn sshfs_source(&self) -> String {
        format!("{}:{}", self.ssh_destination(), self.remote_mount_point)
    }

    /// Remote commands need sudo unless we already log in as root.
    pub fn needs_sudo(&self) -> bool {
        self.username != "root"
    }

    /// Checks every required field; returns a list of human-readable issues.
    /// An empty list means the profile is usable.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.name.trim().is_empty() {
            issues.push("profile name is empty".to_string());
        }
        if self.name.contains('/') || self.name.contains('\0') {
            issues.push(format!("profile name '{}' is not a valid filename", self.name));
        }
        if self.host.trim().is_empty() {
            issues.push("host is empty".to_string());
        }
        if self.username.trim().is_empty() {
            issues.push("username is empty".to_string());
        }
        if let AuthMethod::InsecurePassword { password } = &self.auth {
            if password.is_empty() {
                issues.push("stored password is empty".to_string());
            }
        }
        if !self.remote_device.starts_with('/') {
            issues.push(format!(
                "remote_device '{}' is not an absolute device path",
                self.remote_device
            ));
        }
        if self.remote_mapper_name.trim().is_empty() || self.remote_mapper_name.contains('/') {
            issues.push(format!(
                "remote_mapper_name '{}' is not a valid device-mapper name",
                self.remote_mapper_name
            ));
        }
        if !self.remote_mount_point.starts_with('/') {
            issues.push(format!(
                "remote_mount_point '{}' is not an absolute path",
                self.remote_mount_point
            ));
        }
        if self.local_mount_point.as_os_str().is_empty() {
            issues.push("local_mount_point is empty".to_string());
        }
        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_profile() -> Profile {
        Profile {
            name: "vault1".to_string(),
            host: "203.0.113.7".to_string(),
            port: 2222,
            username: "admin".to_string(),
            auth: AuthMethod::KeyBased,
            remote_device: "/dev/sdb1".to_string(),
            remote_mapper_name: "vault1map".to_string(),
            remote_mount_point: "/mnt/encrypted".to_string(),
            local_mount_point: PathBuf::from("/home/user/.LUKS-VAULT/mnt/vault1"),
        }
    }

    #[test]
    fn test_ssh_destination() {
        assert_eq!(sample_profile().ssh_destination(), "admin@203.0.113.7");
    }

    #[test]
    fn test_mapper_path() {
        assert_eq!(sample_profile().mapper_path(), "/dev/mapper/vault1map");
    }

    #[test]
    fn test_sshfs_source() {
        assert_eq!(
            sample_profile().sshfs_source(),
            "admin@203.0.113.7:/mnt/encrypted"
        );
    }

    #[test]
    fn test_needs_sudo() {
        let mut profile = sample_profile();
        assert!(profile.needs_sudo());
        profile.username = "root".to_string();
        assert!(!profile.needs_sudo());
    }

    #[test]
    fn test_validate_accepts_sample() {
        assert!(sample_profile().validate().is_empty());
    }

    #[test]
    fn test_validate_flags_bad_fields() {
        let mut profile = sample_profile();
        profile.name = "a/b".to_string();
        profile.host = " ".to_string();
        profile.remote_device = "sdb1".to_string();
        let issues = profile.validate();
        assert_eq!(issues.len(), 3);
    }

    #[test]
    fn test_port_defaults_on_deserialize() {
        let json = r#"{
            "name": "v",
            "host": "h",
            "username": "u",
            "auth": "key_based",
            "remote_device": "/dev/sdb1",
            "remote_mapper_name": "m",
            "remote_mount_point": "/mnt/encrypted",
            "local_mount_point": "/tmp/v"
        }"#;
        let profile: Profile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.port, DEFAULT_SSH_PORT);
    }

    #[test]
    fn test_stored_password_round_trip() {
        let mut profile = sample_profile();
        profile.auth = AuthMethod::InsecurePassword {
            password: "hunter2".to_string(),
        };
        let json = serde_json::to_string(&profile).unwrap();
        assert!(json.contains("insecure_password"));
        let back: Profile = serde_json::from_str(&json).unwrap();
        assert_eq!(back.auth.password(), Some("hunter2"));
    }
}
