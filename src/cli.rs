use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::hdmi::ModeRequest;
use crate::sim::parse_edid_arg;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(subcommand_value_name = "SUBCOMMAND")]
#[command(subcommand_help_heading = "Subcommands")]
pub struct Cli {
    /// Path to the transmitter configuration.
    #[arg(short, long, default_value = "fpga-hdmi.kdl")]
    pub config: PathBuf,
    /// Serve an EDID dump on a DDC adapter (repeatable).
    #[arg(long = "edid", value_name = "ADAPTER=FILE", value_parser = parse_edid_arg)]
    pub edids: Vec<(String, PathBuf)>,

    #[command(subcommand)]
    pub subcommand: Sub,
}

#[derive(Subcommand)]
pub enum Sub {
    /// List the modes every output offers.
    Modes {
        /// Also list modes the transmitter cannot drive.
        #[arg(long)]
        all: bool,
    },
    /// Report whether a sink is connected to every output.
    Detect,
    /// Bind every output, program a mode and enable it, then tear everything down.
    Commit {
        /// Mode to program, as WIDTHxHEIGHT or WIDTHxHEIGHT@REFRESH.
        #[arg(long)]
        mode: Option<ModeRequest>,
        /// Only commit this output.
        #[arg(long)]
        output: Option<String>,
    },
    /// Validate the config file and exit.
    ValidateConfig,
}
