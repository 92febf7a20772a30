//! Interactive prompts for profile creation.

use std::io::{self, Write};
use std::path::PathBuf;

use remote_vault_core::profile::{
    DEFAULT_MAPPER_NAME, DEFAULT_REMOTE_MOUNT_POINT, DEFAULT_SSH_PORT,
};
use remote_vault_core::{AuthMethod, Profile, ProfileStore};

/// Prints a prompt and reads one trimmed line.
pub fn read_line(prompt: &str) -> io::Result<String> {
    print!("{prompt}");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// Loops until the user enters something non-empty.
fn prompt_required(label: &str) -> io::Result<String> {
    loop {
        let value = read_line(&format!("{label}: "))?;
        if !value.is_empty() {
            return Ok(value);
        }
        println!("{label} cannot be empty");
    }
}

/// Prompts with a default shown in brackets; empty input takes the default.
fn prompt_with_default(label: &str, default: &str) -> io::Result<String> {
    let value = read_line(&format!("{label} [{default}]: "))?;
    Ok(if value.is_empty() {
        default.to_string()
    } else {
        value
    })
}

fn prompt_port() -> io::Result<u16> {
    loop {
        let value = prompt_with_default("Port", &DEFAULT_SSH_PORT.to_string())?;
        match value.parse::<u16>() {
            Ok(port) if port > 0 => return Ok(port),
            _ => println!("'{value}' is not a valid port"),
        }
    }
}

/// Key-based auth is the default; storing a password is an explicit opt-in
/// and labeled insecure at the prompt.
fn prompt_auth() -> io::Result<AuthMethod> {
    let answer = read_line("Store the SSH password in the profile file? INSECURE (plaintext) [y/N]: ")?;
    if !answer.eq_ignore_ascii_case("y") {
        println!("Using key-based authentication (ssh agent / identity files).");
        return Ok(AuthMethod::KeyBased);
    }
    loop {
        let password = rpassword::prompt_password("SSH password: ")?;
        if !password.is_empty() {
            return Ok(AuthMethod::InsecurePassword { password });
        }
        println!("Password cannot be empty");
    }
}

/// Collects every profile field interactively.
pub fn collect_profile(store: &ProfileStore) -> io::Result<Profile> {
    println!("\nNew profile:");
    let name = prompt_required("Profile name")?;

    println!("\nSSH connection details:");
    let host = prompt_required("Hostname/IP")?;
    let port = prompt_port()?;
    let username = prompt_required("Username")?;
    let auth = prompt_auth()?;

    println!("\nLUKS volume details:");
    let remote_device = prompt_required("Device (e.g. /dev/sdb1)")?;
    let remote_mapper_name = prompt_with_default("Mapper name", DEFAULT_MAPPER_NAME)?;
    let remote_mount_point =
        prompt_with_default("Remote mount point", DEFAULT_REMOTE_MOUNT_POINT)?;

    let default_local = store.default_local_mount_point(&name);
    let local_mount_point = PathBuf::from(prompt_with_default(
        "Local mount point",
        &default_local.display().to_string(),
    )?);

    Ok(Profile {
        name,
        host,
        port,
        username,
        auth,
        remote_device,
        remote_mapper_name,
        remote_mount_point,
        local_mount_point,
    })
}
