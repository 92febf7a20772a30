//! Remote Vault CLI - interactive manager for remote LUKS vault sessions.
//!
//! Bare invocation enters the interactive menu; `list`, `connect` and
//! `delete` exist as non-interactive shortcuts for scripting. The process
//! exits non-zero whenever a disconnect left anything behind, so wrapper
//! scripts can check for leftover mounts.

mod menu;
mod prompts;

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::warn;

use menu::MenuAction;
use remote_vault_core::{
    Error, Orchestrator, Profile, ProfileStore, SshTransport, SshfsBridge, TeardownReport, deps,
    recovery, session,
};

/// How long the TCP preflight waits before declaring the host unreachable.
const REACHABILITY_TIMEOUT: Duration = Duration::from_secs(5);

/// Remote Vault CLI tool.
#[derive(Parser)]
#[command(name = "remote-vault")]
#[command(about = "Mount remote LUKS-encrypted volumes over SSH", long_about = None)]
struct Cli {
    /// Base directory for profiles and default mount points.
    #[arg(long)]
    base_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List saved profiles.
    List,
    /// Connect a saved profile directly, skipping the menu.
    Connect { name: String },
    /// Delete a saved profile.
    Delete { name: String },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let store = match cli.base_dir {
        Some(base) => ProfileStore::open(base)?,
        None => ProfileStore::open_default()?,
    };

    match cli.command {
        Some(Commands::List) => {
            for name in store.list_profiles()? {
                println!("{name}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Delete { name }) => {
            store.delete_profile(&name)?;
            println!("Deleted profile '{name}'.");
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Connect { name }) => connect_profile(&store, &name),
        None => interactive_menu(&store),
    }
}

fn interactive_menu(store: &ProfileStore) -> Result<ExitCode> {
    println!("=== Remote LUKS Vault Manager ===");

    loop {
        let names = store.list_profiles()?;
        if names.is_empty() {
            println!("\nNo saved profiles yet.");
        } else {
            println!("\nSaved profiles:");
            for (i, name) in names.iter().enumerate() {
                match store.load_profile(name) {
                    Ok(p) => println!("{}. {} ({}:{})", i + 1, name, p.host, p.port),
                    Err(e) => println!("{}. {} (unreadable: {e})", i + 1, name),
                }
            }
        }
        println!("\n[number/name] connect   (a)dd   (d <name>) delete   (q)uit");

        let input = prompts::read_line("> ")?;
        match menu::parse_action(&input, &names) {
            Some(MenuAction::AddProfile) => {
                let profile = prompts::collect_profile(store)?;
                let issues = profile.validate();
                if !issues.is_empty() {
                    println!("Profile not saved:");
                    for issue in issues {
                        println!("  - {issue}");
                    }
                    continue;
                }
                store.save_profile(&profile)?;
                println!("Saved profile '{}'.", profile.name);
            }
            Some(MenuAction::ListProfiles) => {}
            Some(MenuAction::Delete(name)) => match store.delete_profile(&name) {
                Ok(()) => println!("Deleted profile '{name}'."),
                Err(e) => println!("{e}"),
            },
            Some(MenuAction::Connect(name)) => return connect_profile(store, &name),
            Some(MenuAction::Quit) => return Ok(ExitCode::SUCCESS),
            None => println!("Unrecognized choice '{input}'."),
        }
    }
}

/// Full session lifecycle for one profile: preflight, connect, wait for the
/// exit keypress, disconnect, report.
fn connect_profile(store: &ProfileStore, name: &str) -> Result<ExitCode> {
    let profile = store.load_profile(name)?;
    if profile.auth.password().is_some() {
        warn!(
            "profile '{}' uses a stored plaintext password; prefer key-based auth",
            profile.name
        );
    }

    if let Err(e) = deps::check_dependencies(profile.auth.password().is_some()) {
        eprintln!("{e}");
        eprintln!("{}", deps::install_hint());
        return Ok(ExitCode::FAILURE);
    }

    let shell = SshTransport::from_profile(&profile);
    println!("Checking {}:{} ...", profile.host, profile.port);
    shell.check_reachable(REACHABILITY_TIMEOUT)?;
    shell.check_session()?;
    shell.check_remote_cryptsetup()?;

    let passphrase = rpassword::prompt_password("LUKS passphrase: ")?;

    let bridge = SshfsBridge::new();
    let orchestrator = Orchestrator::new(&shell, &bridge).with_file_manager();

    println!("Connecting '{}' ...", profile.name);
    let session = match orchestrator.connect(&profile, &passphrase) {
        Ok(session) => session,
        Err(e) => {
            report_connect_failure(&e, &profile);
            return Ok(ExitCode::FAILURE);
        }
    };

    println!(
        "\nMounted. Access files at: {}",
        profile.local_mount_point.display()
    );
    print!("Press Enter to unmount and disconnect... ");
    std::io::stdout().flush()?;
    session::wait_for_exit_signal()?;

    let report = orchestrator.disconnect(session);
    report_teardown(&report, &profile);
    Ok(if report.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn report_connect_failure(error: &Error, profile: &Profile) {
    match error {
        Error::Connect {
            step,
            source,
            rollback,
        } => {
            eprintln!("\nConnect failed at step '{step}':");
            eprintln!("  {source}");
            for line in rollback {
                eprintln!("  rollback: {line}");
            }
            eprintln!(
                "  manual recovery: {}",
                recovery::recovery_hint(step, source, profile)
            );
        }
        other => eprintln!("\nConnect failed: {other}"),
    }
}

fn report_teardown(report: &TeardownReport, profile: &Profile) {
    if report.is_clean() {
        println!("Volume unmounted and locked.");
        return;
    }
    println!("Disconnect finished with failures:");
    for (step, error) in report.failures() {
        println!("  [{}] {}", step.name(), error);
        println!(
            "      manual recovery: {}",
            recovery::recovery_hint(step.name(), error, profile)
        );
    }
}
