// wad.rs from rustrvth (c) 2025 NinjaCheetah & Contributors
// https://github.com/NinjaCheetah/rustrvth
//
// Implements the WAD info and resign commands for the CLI.

use std::path::{Path, PathBuf};
use anyhow::{bail, Result};
use clap::Subcommand;
use rustrvth::title::cert::SigningKeys;
use rustrvth::title::wad::{identify, resign_file, Wad};
use rustrvth::title::CryptoType;

#[derive(Subcommand)]
pub enum Commands {
    /// Print information about a WAD file
    Info {
        /// The path to a WAD file
        input: PathBuf,
        /// Decrypt and verify every content against its TMD hash
        #[arg(short = 'V', long)]
        verify: bool,
    },
    /// Re-sign a WAD file for a new encryption domain
    Resign {
        /// The path to the source WAD
        input: PathBuf,
        /// The path for the re-signed WAD
        output: PathBuf,
        /// Target encryption key (debug, retail, korean, vwii); debug if omitted
        #[arg(short, long)]
        recrypt: Option<String>,
    },
}

pub fn info(input: &Path, verify: bool) -> Result<()> {
    let data = std::fs::read(input)?;
    let Some(wad_type) = identify(&data) else {
        bail!("WAD file '{}' is not valid", input.display());
    };
    let wad = Wad::from_bytes(&data)?;
    let ticket = wad.parse_ticket()?;
    let tmd = wad.parse_tmd()?;

    println!("{}:", input.display());
    println!("Type: {wad_type}");
    let tid = tmd.title_id();
    println!(
        "- Title ID:      {}-{}",
        hex::encode_upper(&tid[..4]),
        hex::encode_upper(&tid[4..])
    );
    // Game ID, but only if all characters are alphanumeric.
    if tid[4..8].iter().all(|b| b.is_ascii_alphanumeric()) {
        println!("- Game ID:       {}", String::from_utf8_lossy(&tid[4..8]));
    }
    let version = tmd.title_version();
    println!("- Title version: {}.{} (v{})", version >> 8, version & 0xFF, version);
    println!("- IOS version:   {}", tmd.ios_version());
    println!("- Encryption:    {}", ticket.crypto_type());

    let (sig_ticket, sig_tmd) = wad.sig_statuses();
    println!("- Ticket Signature: {}{}", ticket.issuer(), sig_ticket);
    println!("- TMD Signature:    {}{}", tmd.issuer(), sig_tmd);
    println!();

    if ticket.issuer().is_retail() && ticket.common_key_index() > 2 {
        // Plenty of retail WADs carry a bogus index; the key was guessed
        // from the game ID.
        eprintln!(
            "*** WARNING: invalid common key index {}; assuming the {} key based on the game ID\n",
            ticket.common_key_index(),
            ticket.crypto_type()
        );
    }

    println!("Contents:");
    let results = if verify { Some(wad.verify_contents()?) } else { None };
    let mut failed = false;
    for (i, record) in tmd.content_records().iter().enumerate() {
        print!(
            "#{}: ID={:08x}, type={:04X}, size={}",
            record.index, record.content_id, record.content_type, record.content_size
        );
        if record.index == tmd.boot_index() {
            print!(", bootable");
        }
        match results.as_ref().map(|r| r[i]) {
            Some(true) => println!(" [SHA-1 OK]"),
            Some(false) => {
                println!(" [SHA-1 ERROR]");
                failed = true;
            }
            None => println!(),
        }
    }
    if failed {
        bail!("one or more contents failed verification");
    }
    Ok(())
}

pub fn resign(input: &Path, output: &Path, key: CryptoType) -> Result<()> {
    resign_file(input, output, key, &SigningKeys::from_env())?;
    println!("Resigned {} -> {} ({})", input.display(), output.display(), key);
    Ok(())
}
