use std::path::PathBuf;
use std::process::{Command as StdCommand, Stdio};
use std::time::Duration;

use clap::Parser;
use kube_porter::cli::{Cli, Command, OutputFormat};
use kube_porter::client::Client;
use kube_porter::error::{Error, Result};
use kube_porter::registry::ForwarderStatus;
use kube_porter::{logging, supervisor};

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Serve { manifest, kubeconfig, logdir } => serve(cli.socket, manifest, kubeconfig, logdir, cli.debug),
        Command::Start { manifest, kubeconfig, logdir } => start(cli.socket, manifest, kubeconfig, logdir, cli.debug),
        Command::Stop => stop(cli.socket),
        Command::Status { output } => status(cli.socket, output),
        Command::Logfile => logfile(cli.socket),
    }
}

fn serve(socket: String, manifest: PathBuf, kubeconfig: Option<PathBuf>, logdir: PathBuf, debug: bool) -> Result<()> {
    let log_handle = logging::init(&logdir, debug).map_err(Error::Other)?;
    let logfile = log_handle.path.clone();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(Error::Io)?;
    runtime.block_on(supervisor::run(socket, manifest, kubeconfig, logfile))?;
    Ok(())
}

fn start(socket: String, manifest: PathBuf, kubeconfig: Option<PathBuf>, logdir: PathBuf, debug: bool) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(Error::Io)?;
    let client = Client::new(socket.clone());

    if runtime.block_on(client.ready()).is_ok() {
        return Err(Error::Other(anyhow::anyhow!("kube-porter is already running")));
    }

    let exe = std::env::current_exe().map_err(Error::Io)?;
    let mut cmd = StdCommand::new(exe);
    cmd.arg("serve")
        .arg("--socket")
        .arg(&socket)
        .arg("--manifest")
        .arg(&manifest)
        .arg("--logdir")
        .arg(&logdir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    if let Some(kubeconfig) = &kubeconfig {
        cmd.arg("--kubeconfig").arg(kubeconfig);
    }
    if debug {
        cmd.arg("--debug");
    }
    cmd.spawn().map_err(Error::Io)?;

    runtime.block_on(async {
        for _ in 0..5 {
            tokio::time::sleep(Duration::from_secs(1)).await;
            if client.ready().await.is_ok() {
                return Ok(());
            }
        }
        Err(Error::NotReady)
    })
}

fn stop(socket: String) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(Error::Io)?;
    runtime.block_on(Client::new(socket).stop())
}

fn logfile(socket: String) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(Error::Io)?;
    let path = runtime.block_on(Client::new(socket).logfile())?;
    println!("{path}");
    Ok(())
}

fn status(socket: String, output: OutputFormat) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(Error::Io)?;
    let body = runtime.block_on(Client::new(socket).status())?;

    match output {
        OutputFormat::Json => println!("{body}"),
        OutputFormat::Text => {
            let entries: Vec<ForwarderStatus> =
                serde_json::from_str(&body).map_err(|e| Error::Other(anyhow::anyhow!(e)))?;
            println!("Type\tNamespace\tName\tPorts\tForwarding");
            for entry in entries {
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    entry.kind,
                    entry.namespace,
                    entry.name,
                    entry.ports.join(","),
                    entry.forwarding
                );
            }
        }
    }
    Ok(())
}
