// list.rs from rustrvth (c) 2025 NinjaCheetah & Contributors
// https://github.com/NinjaCheetah/rustrvth
//
// Implements the bank listing for the CLI.

use chrono::DateTime;
use rustrvth::disc::header::region_name;
use rustrvth::hdd::{BankType, RvtH};
use rustrvth::title::cert::CertIssuer;

/// Prints a human-readable table of every bank in the image.
pub fn print_banks(rvth: &RvtH) {
    if rvth.is_hdd() {
        println!("RVT-H disk image: {} banks", rvth.bank_count());
    } else {
        println!("Standalone disc image");
    }
    println!();
    for entry in rvth.banks() {
        let bank = entry.index() + 1;
        match entry.bank_type() {
            BankType::Empty => {
                println!("Bank {bank}: Empty");
                continue;
            }
            BankType::Unknown => {
                println!("Bank {bank}: Unknown");
                continue;
            }
            BankType::WiiDLBank2 => {
                println!("Bank {bank}: (second half of the dual-layer image in bank {})", bank - 1);
                continue;
            }
            _ => {}
        }

        let deleted = if entry.is_deleted() { " [DELETED]" } else { "" };
        println!("Bank {bank}: {}{deleted}", entry.bank_type());
        println!("- Title:     {}", entry.game_title());
        println!("- Game ID:   {}", entry.game_id());
        println!("- Region:    {}", region_name(entry.region_code()));
        if entry.timestamp() >= 0 {
            if let Some(dt) = DateTime::from_timestamp(entry.timestamp(), 0) {
                println!("- Timestamp: {}", dt.format("%Y-%m-%d %H:%M:%S"));
            }
        }
        println!("- Crypto:    {}", entry.crypto_type());
        if let (Some(sig_ticket), Some(sig_tmd)) = (entry.sig_status_ticket(), entry.sig_status_tmd()) {
            let ticket_issuer =
                entry.ticket().map(|t| t.issuer()).unwrap_or(CertIssuer::Unknown);
            let tmd_issuer = entry.tmd().map(|t| t.issuer()).unwrap_or(CertIssuer::Unknown);
            println!("- Ticket Signature: {ticket_issuer}{sig_ticket}");
            println!("- TMD Signature:    {tmd_issuer}{sig_tmd}");
        }
        if entry.ios_version() != 0 {
            println!("- IOS:       {}", entry.ios_version());
        }
        if entry.is_imported() {
            println!("- Imported by this tool");
        }
        println!();
    }
}
