//! Remote shell transport.
//!
//! Remote commands run over a fresh `ssh` invocation per command (key-based
//! auth, the preferred mode) or `sshpass -p ... ssh` when the profile opted
//! into stored-password auth. The [`RemoteShell`] trait is the seam the
//! executor and orchestrator are written against, so tests can substitute a
//! scripted shell and assert on the exact command sequence.

use std::io::Write;
use std::net::{TcpStream, ToSocketAddrs};
use std::process::{Command, Stdio};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::profile::{AuthMethod, Profile};

/// Seconds ssh/sshpass wait for the TCP/SSH handshake before giving up.
pub const SSH_CONNECT_TIMEOUT_SECS: u32 = 20;

/// Marker echoed by the remote side during the session preflight.
const SESSION_PROBE_MARKER: &str = "VAULT_SESSION_OK";

/// Captured result of one remote command.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    /// Process exit code (-1 when terminated by signal).
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// Best diagnostic text: stderr when present, stdout otherwise.
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }
}

/// Executes one command on the remote host, optionally feeding it stdin.
pub trait RemoteShell {
    fn exec(&self, command: &str, stdin: Option<&[u8]>) -> Result<ExecOutput>;
}

/// Process-spawning [`RemoteShell`] backed by the system ssh client.
#[derive(Debug, Clone)]
pub struct SshTransport {
    host: String,
    port: u16,
    username: String,
    auth: AuthMethod,
}

impl SshTransport {
    pub fn from_profile(profile: &Profile) -> Self {
        Self {
            host: profile.host.clone(),
            port: profile.port,
            username: profile.username.clone(),
            auth: profile.auth.clone(),
        }
    }

    /// Checks that the SSH port accepts TCP connections at all. Catches
    /// firewall/port-forwarding mistakes with a clearer message than an ssh
    /// timeout would give.
    pub fn check_reachable(&self, timeout: Duration) -> Result<()> {
        let addrs = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| Error::Connection {
                host: self.host.clone(),
                port: self.port,
                detail: format!("address resolution failed: {e}"),
            })?;

        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(_) => return Ok(()),
                Err(e) => last_err = Some(e),
            }
        }
        Err(Error::Connection {
            host: self.host.clone(),
            port: self.port,
            detail: match last_err {
                Some(e) => format!("port not reachable: {e}"),
                None => "no addresses resolved".to_string(),
            },
        })
    }

    /// Runs a round-trip echo over the real SSH path to verify credentials
    /// before any privileged command is attempted.
    pub fn check_session(&self) -> Result<()> {
        let output = self.exec(&format!("echo {SESSION_PROBE_MARKER}"), None)?;
        if output.stdout.contains(SESSION_PROBE_MARKER) {
            return Ok(());
        }
        let detail = output.diagnostic();
        if detail.contains("Permission denied") {
            return Err(Error::Auth { detail });
        }
        Err(Error::Connection {
            host: self.host.clone(),
            port: self.port,
            detail,
        })
    }

    /// Verifies cryptsetup is installed on the remote host.
    pub fn check_remote_cryptsetup(&self) -> Result<()> {
        let output = self.exec("command -v cryptsetup", None)?;
        if output.success() {
            Ok(())
        } else {
            Err(Error::MissingDependency {
                tools: vec![format!("cryptsetup on {}", self.host)],
            })
        }
    }

    /// Assembles the local program and argument list for one remote command.
    fn build_command(&self, remote_command: &str) -> (String, Vec<String>) {
        let mut args: Vec<String> = Vec::new();
        let program = match &self.auth {
            AuthMethod::InsecurePassword { password } => {
                args.push("-p".to_string());
                args.push(password.clone());
                args.push("ssh".to_string());
                "sshpass".to_string()
            }
            AuthMethod::KeyBased => {
                args.push("-o".to_string());
                args.push("BatchMode=yes".to_string());
                "ssh".to_string()
            }
        };

        args.push("-p".to_string());
        args.push(self.port.to_string());
        args.push("-o".to_string());
        args.push("StrictHostKeyChecking=accept-new".to_string());
        args.push("-o".to_string());
        args.push(format!("ConnectTimeout={SSH_CONNECT_TIMEOUT_SECS}"));
        args.push(format!("{}@{}", self.username, self.host));
        args.push(remote_command.to_string());

        (program, args)
    }
}

impl RemoteShell for SshTransport {
    fn exec(&self, command: &str, stdin: Option<&[u8]>) -> Result<ExecOutput> {
        let (program, args) = self.build_command(command);
        let label = format!("ssh {}", command);

        let mut child = Command::new(&program)
            .args(&args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::CommandSpawn {
                command: label.clone(),
                source: e,
            })?;

        if let Some(payload) = stdin {
            if let Some(mut pipe) = child.stdin.take() {
                pipe.write_all(payload).map_err(|e| Error::CommandSpawn {
                    command: label.clone(),
                    source: e,
                })?;
            }
        }

        let output = child
            .wait_with_output()
            .map_err(|e| Error::CommandSpawn {
                command: label,
                source: e,
            })?;

        Ok(ExecOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}
