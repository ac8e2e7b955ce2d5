use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::unix_socket;

#[derive(Parser, Debug)]
#[command(name = "kube-porter", about = "Declarative Kubernetes port-forward daemon")]
pub struct Cli {
    /// Control socket path, or `@name` for a Linux abstract socket.
    #[arg(long, global = true, default_value_t = unix_socket::default_path())]
    pub socket: String,

    /// Enable debug logging.
    #[arg(long, global = true, default_value_t = false)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the daemon in the foreground.
    Serve {
        #[arg(long)]
        manifest: PathBuf,
        #[arg(long)]
        kubeconfig: Option<PathBuf>,
        #[arg(long)]
        logdir: PathBuf,
    },
    /// Spawn `serve` as a detached child and wait until it is ready.
    Start {
        #[arg(long)]
        manifest: PathBuf,
        #[arg(long)]
        kubeconfig: Option<PathBuf>,
        #[arg(long)]
        logdir: PathBuf,
    },
    /// Stop the running daemon.
    Stop,
    /// Print the current forwarder set.
    Status {
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,
    },
    /// Print the daemon's log file path.
    Logfile,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Text,
}
