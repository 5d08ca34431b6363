//! CLI surface: profile validation, a replay-driven run of the pipeline,
//! and the virtual-HID bridge process.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "remapd")]
#[command(author, version, about = "User-level keyboard/pointing-device remapper daemon")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse and structurally validate a complex-modifications profile
    /// without running the pipeline.
    Validate {
        /// Path to the profile JSON file.
        #[arg(long)]
        profile: PathBuf,
    },

    /// Run the remapping pipeline against a recorded event replay,
    /// forwarding synthesized report frames to the virtual-HID bridge.
    Run {
        /// Path to the profile JSON file.
        #[arg(long)]
        profile: PathBuf,
        /// Path to a JSON-lines recorded event stream (one `ReplayEntry`
        /// per line).
        #[arg(long)]
        replay: PathBuf,
        /// Daemon settings TOML (socket paths, device name, log level).
        #[arg(long)]
        settings: Option<PathBuf>,
    },

    /// Run the virtual-HID bridge: listens for report frames on the
    /// configured sockets and applies them to a `uinput` device.
    ServeVirtualDevice {
        #[arg(long)]
        settings: Option<PathBuf>,
    },
}
