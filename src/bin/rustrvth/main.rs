// main.rs from rustrvth (c) 2025 NinjaCheetah & Contributors
// https://github.com/NinjaCheetah/rustrvth
//
// Base for the rustrvth CLI that handles argument parsing and directs
// execution to the proper module.

mod list;
mod wad;

use std::path::PathBuf;
use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use rustrvth::hdd::extract::EXTRACT_PREPEND_SDK_HEADER;
use rustrvth::hdd::{ProgressState, RvtH};
use rustrvth::title::CryptoType;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable detailed debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
#[command(arg_required_else_help = true)]
enum Commands {
    /// List the banks in an RVT-H disk image or device
    List {
        /// The path to an RVT-H disk image or device
        image: PathBuf,
    },
    /// Extract a bank to a standalone disc image
    Extract {
        /// The path to an RVT-H disk image, device, or disc image
        image: PathBuf,
        /// Bank number (1-8)
        bank: usize,
        /// Destination GCM filename
        output: PathBuf,
        /// Re-encrypt the image for this key (debug, retail, korean, vwii)
        #[arg(short, long)]
        recrypt: Option<String>,
        /// Prepend a 32 KiB SDK header so the image loads on NDEV
        #[arg(short = 'N', long)]
        ndev: bool,
    },
    /// Import a standalone disc image into a bank
    Import {
        /// The path to an RVT-H disk image or device
        image: PathBuf,
        /// Bank number (1-8)
        bank: usize,
        /// Source GCM filename
        input: PathBuf,
    },
    /// Delete a bank (the image stays until something overwrites it)
    Delete {
        /// The path to an RVT-H disk image or device
        image: PathBuf,
        /// Bank number (1-8)
        bank: usize,
    },
    /// Undelete a previously deleted bank
    Undelete {
        /// The path to an RVT-H disk image or device
        image: PathBuf,
        /// Bank number (1-8)
        bank: usize,
    },
    /// Get info about or re-sign a WAD file
    Wad {
        #[command(subcommand)]
        command: wad::Commands,
    },
}

/// Maps a --recrypt argument onto an encryption domain.
fn parse_recrypt_key(name: &str) -> Result<CryptoType> {
    match name.to_ascii_lowercase().as_str() {
        "debug" => Ok(CryptoType::Debug),
        "retail" => Ok(CryptoType::Retail),
        "korean" => Ok(CryptoType::Korean),
        "vwii" => Ok(CryptoType::Vwii),
        _ => Err(anyhow!("unknown encryption key `{name}` (expected debug, retail, korean, or vwii)")),
    }
}

/// One-based bank numbers on the command line, zero-based inside the engine.
fn bank_index(bank: usize) -> Result<usize> {
    if bank == 0 {
        return Err(anyhow!("bank numbers start at 1"));
    }
    Ok(bank - 1)
}

fn progress_line(state: &ProgressState) -> bool {
    if state.lba_total > 0 {
        let pct = state.lba_processed as u64 * 100 / state.lba_total as u64;
        eprint!("\r{:3}% ({} / {} LBAs)", pct, state.lba_processed, state.lba_total);
        if state.lba_processed == state.lba_total {
            eprintln!();
        }
    }
    true
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    match &cli.command {
        Some(Commands::List { image }) => {
            let rvth = RvtH::open(image)?;
            list::print_banks(&rvth);
        }
        Some(Commands::Extract { image, bank, output, recrypt, ndev }) => {
            let mut rvth = RvtH::open(image)?;
            let recrypt_key = recrypt.as_deref().map(parse_recrypt_key).transpose()?;
            let flags = if *ndev { EXTRACT_PREPEND_SDK_HEADER } else { 0 };
            let mut progress = progress_line;
            rvth.extract(bank_index(*bank)?, output, recrypt_key, flags, Some(&mut progress))?;
            println!("Extracted bank {} to {}", bank, output.display());
        }
        Some(Commands::Import { image, bank, input }) => {
            let mut rvth = RvtH::open(image)?;
            let mut progress = progress_line;
            rvth.import(bank_index(*bank)?, input, Some(&mut progress))?;
            println!("Imported {} into bank {}", input.display(), bank);
        }
        Some(Commands::Delete { image, bank }) => {
            let mut rvth = RvtH::open(image)?;
            rvth.delete_bank(bank_index(*bank)?)?;
            println!("Deleted bank {}", bank);
        }
        Some(Commands::Undelete { image, bank }) => {
            let mut rvth = RvtH::open(image)?;
            rvth.undelete_bank(bank_index(*bank)?)?;
            println!("Undeleted bank {}", bank);
        }
        Some(Commands::Wad { command }) => match command {
            wad::Commands::Info { input, verify } => wad::info(input, *verify)?,
            wad::Commands::Resign { input, output, recrypt } => {
                let key = parse_recrypt_key(recrypt.as_deref().unwrap_or("debug"))?;
                wad::resign(input, output, key)?;
            }
        },
        None => { /* Clap handles no passed command by itself */ }
    }
    Ok(())
}
