use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use torthread_core::{TorLaunchOptions, error::Result};

mod logging;
mod commands {
    pub mod args;
    pub mod control_port;
    #[cfg(feature = "tor")]
    pub mod run;
}

#[derive(Parser)]
#[command(name = "torthread")]
#[command(about = "Run an embedded Tor daemon on a background thread", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the command line the daemon would be started with
    Args(LaunchArgs),
    /// Start the daemon and wait until it exits
    #[cfg(feature = "tor")]
    Run {
        #[command(flatten)]
        launch: LaunchArgs,
        #[arg(long, default_value_t = 5, help = "Seconds to wait for the control port file")]
        control_timeout: u64,
    },
    /// Wait for a control port file and print its address
    ControlPort {
        #[arg(long, help = "Path passed to ControlPortWriteToFile")]
        file: PathBuf,
        #[arg(long, default_value_t = 5)]
        timeout: u64,
    },
}

#[derive(Args, Debug, Default)]
pub struct LaunchArgs {
    #[arg(long, help = "INI file with a [tor] section")]
    config: Option<PathBuf>,
    #[arg(long)]
    socks_port: Option<u16>,
    #[arg(long)]
    control_port: Option<String>,
    #[arg(long)]
    control_port_file: Option<PathBuf>,
    #[arg(long)]
    data_directory: Option<PathBuf>,
    #[arg(long, help = "Tor Log directive, e.g. \"notice stdout\"")]
    log: Option<String>,
    #[arg(last = true, help = "Extra arguments passed to the daemon verbatim")]
    extra: Vec<String>,
}

impl LaunchArgs {
    pub fn resolve(self) -> Result<TorLaunchOptions> {
        let mut options = match &self.config {
            Some(path) => TorLaunchOptions::load_from_file(path)?,
            None => TorLaunchOptions::from_platform_directories()?,
        };
        self.apply_to(&mut options);
        Ok(options)
    }

    fn apply_to(self, options: &mut TorLaunchOptions) {
        if let Some(socks_port) = self.socks_port {
            options.socks_port = socks_port;
        }
        if let Some(control_port) = self.control_port {
            options.control_port = control_port;
        }
        if let Some(control_port_file) = self.control_port_file {
            options.control_port_file = control_port_file;
        }
        if let Some(data_directory) = self.data_directory {
            options.data_directory = data_directory;
        }
        if let Some(log) = self.log {
            options.log = log;
        }
        options.extra_arguments.extend(self.extra);
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    logging::init_tracing()?;
    let cli = Cli::parse();

    match cli.command {
        Commands::Args(launch) => commands::args::print_arguments(launch)?,
        #[cfg(feature = "tor")]
        Commands::Run {
            launch,
            control_timeout,
        } => commands::run::run(launch, control_timeout).await?,
        Commands::ControlPort { file, timeout } => {
            commands::control_port::print_control_port(&file, timeout).await?
        }
    }
    Ok(())
}
