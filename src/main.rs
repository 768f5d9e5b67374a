mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use log::error;

use ntsvc::control::UnsupportedControl;
use ntsvc::install::{ControlOutcome, DescriptionOutcome, ServiceRecord};
use ntsvc::nt::MemoryRegistry;
use ntsvc::{InstallRequest, InstallerConfig, NativeInstaller, ServiceInstaller, StatusReport};

fn main() {
    let args = cli::Args::parse();

    env_logger::Builder::new()
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "[{} {} {}:{}] {}",
                buf.timestamp_millis(),
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .filter_level(if args.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .parse_default_env()
        .init();

    match real_main(args) {
        Ok(true) => std::process::exit(0),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("{e:#}");
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    }
}

/// `Ok(false)` is a clean failure whose cause has already been printed.
fn real_main(args: cli::Args) -> Result<bool> {
    let config = InstallerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    if args.dry_run {
        let registry = MemoryRegistry::with_path(&config.services_root);
        let installer = NativeInstaller::new(registry, UnsupportedControl, config);
        return dispatch(&installer, args.sub, true);
    }

    live(config, args.sub)
}

#[cfg(windows)]
fn live(config: InstallerConfig, cmd: cli::Cmd) -> Result<bool> {
    use ntsvc::control::ScmControl;
    use ntsvc::install::privileges::check_privileges;
    use ntsvc::nt::NtDll;

    check_privileges()?;
    let installer = NativeInstaller::new(NtDll, ScmControl, config);
    dispatch(&installer, cmd, false)
}

#[cfg(not(windows))]
fn live(_config: InstallerConfig, _cmd: cli::Cmd) -> Result<bool> {
    ntsvc::install::privileges::check_privileges()?;
    Ok(false)
}

fn dispatch(installer: &dyn ServiceInstaller, cmd: cli::Cmd, dry_run: bool) -> Result<bool> {
    match cmd {
        cli::Cmd::Install {
            exe_path,
            service_name,
            display_name,
            description,
        } => {
            let mut request = InstallRequest::new(exe_path, service_name);
            if let Some(name) = display_name {
                request = request.display_name(name);
            }
            if let Some(text) = description {
                request = request.description(text);
            }
            handle_install(installer, &request, dry_run)
        }
        cli::Cmd::Uninstall { service_name } => handle_uninstall(installer, &service_name),
        cli::Cmd::Start { service_name } => handle_start(installer, &service_name),
        cli::Cmd::Stop { service_name } => handle_stop(installer, &service_name),
        cli::Cmd::Status { service_name } => handle_status(installer, &service_name),
    }
}

fn handle_install(installer: &dyn ServiceInstaller, request: &InstallRequest, dry_run: bool) -> Result<bool> {
    match installer.install(request) {
        Ok(outcome) => {
            println!(
                "Service '{}' installed (key {})",
                outcome.record.name, outcome.disposition
            );
            if let DescriptionOutcome::Failed(e) = outcome.description {
                println!("Warning: description was not set: {e}");
            }
            if dry_run {
                print_record(&outcome.record);
            } else {
                println!("The service may not appear in the Service Control Manager until a reboot or refresh.");
            }
            Ok(true)
        }
        Err(e) => {
            eprintln!("Failed to install: {e}");
            Ok(false)
        }
    }
}

fn handle_uninstall(installer: &dyn ServiceInstaller, service_name: &str) -> Result<bool> {
    match installer.uninstall(service_name) {
        Ok(()) => {
            println!("Service '{service_name}' uninstalled");
            Ok(true)
        }
        Err(e) => {
            eprintln!("Failed to uninstall: {e}");
            Ok(false)
        }
    }
}

fn handle_start(installer: &dyn ServiceInstaller, service_name: &str) -> Result<bool> {
    match installer.start(service_name) {
        Ok(ControlOutcome::AlreadyInState) => {
            println!("Service '{service_name}' is already running");
            Ok(true)
        }
        Ok(ControlOutcome::Changed) => {
            println!("Service '{service_name}' started successfully");
            Ok(true)
        }
        Err(e) => {
            eprintln!("Failed to start: {e}");
            Ok(false)
        }
    }
}

fn handle_stop(installer: &dyn ServiceInstaller, service_name: &str) -> Result<bool> {
    match installer.stop(service_name) {
        Ok(ControlOutcome::AlreadyInState) => {
            println!("Service '{service_name}' is already stopped");
            Ok(true)
        }
        Ok(ControlOutcome::Changed) => {
            println!("Service '{service_name}' stopped successfully");
            Ok(true)
        }
        Err(e) => {
            eprintln!("Failed to stop: {e}");
            Ok(false)
        }
    }
}

fn handle_status(installer: &dyn ServiceInstaller, service_name: &str) -> Result<bool> {
    match installer.status(service_name) {
        Ok(StatusReport::Loaded(status)) => {
            println!("Service Name: {}", status.service_name);
            println!("Display Name: {}", status.display_name);
            println!("Status:       {}", status.current_state);
            println!("Start Type:   {}", status.start);
            println!("Type:         {}", status.service_type);
            Ok(true)
        }
        Ok(StatusReport::RegistryOnly(record)) => {
            println!("Service '{service_name}' exists in the registry but is not yet loaded by the Service Control Manager");
            print_record(&record);
            Ok(true)
        }
        Ok(StatusReport::Incomplete { name, missing }) => {
            eprintln!("Service '{name}' is partially installed: {missing} is missing");
            Ok(false)
        }
        Ok(StatusReport::Missing) => {
            eprintln!("Service '{service_name}' does not exist");
            Ok(false)
        }
        Err(e) => {
            eprintln!("Error checking status: {e}");
            Ok(false)
        }
    }
}

fn print_record(record: &ServiceRecord) {
    println!("  Type:         {} ({:#x})", record.service_type, record.service_type.as_raw());
    println!("  Start:        {} ({})", record.start, record.start.as_raw());
    println!("  ErrorControl: {} ({})", record.error_control, record.error_control.as_raw());
    println!("  ImagePath:    {}", record.image_path);
    println!("  DisplayName:  {}", record.display_name);
    println!("  ObjectName:   {}", record.object_name);
    if let Some(description) = &record.description {
        println!("  Description:  {description}");
    }
}
