// hdd/mod.rs from rustrvth (c) 2025 NinjaCheetah & Contributors
// https://github.com/NinjaCheetah/rustrvth
//
// Implements the bank engine: opening RVT-H HDD images and standalone disc
// images, bank enumeration, and the delete/undelete lifecycle. Extract and
// import live in hdd/extract.rs.

pub mod extract;
pub mod table;

use std::path::Path;
use log::{info, warn};
use crate::disc::header::DiscHeader;
use crate::disc::ptbl::PartitionTable;
use crate::disc::{PartitionHeader, DISC_FLAG_NO_CRYPTO};
use crate::error::{Result, RvtHError};
use crate::reader::{lba_to_bytes, Reader};
use crate::refio::RefFile;
use crate::title::cert::{sig_verify, SigStatus};
use crate::title::ticket::{Ticket, TICKET_SIZE};
use crate::title::tmd::Tmd;
use crate::title::CryptoType;
use self::table::{bank_size_lba, NHCD_BANK_SIZE_LBA, NHCD_BANK_WII_SL_SIZE_RVTR_LBA};

/// What a bank holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BankType {
    Empty,
    Unknown,
    Gcn,
    WiiSL,
    WiiDL,
    /// Synthetic type for the bank following a dual-layer image; it holds
    /// the second half of the image and is never independently usable.
    WiiDLBank2,
}

impl std::fmt::Display for BankType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            BankType::Empty => write!(f, "Empty"),
            BankType::Unknown => write!(f, "Unknown"),
            BankType::Gcn => write!(f, "GameCube"),
            BankType::WiiSL => write!(f, "Wii (SL)"),
            BankType::WiiDL => write!(f, "Wii (DL)"),
            BankType::WiiDLBank2 => write!(f, "Wii (DL) (Bank 2)"),
        }
    }
}

/// The phase a long-running operation reports progress for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressPhase {
    Extract,
    Import,
    Recrypt,
}

/// Progress callback state. The callback returns false to cancel the
/// enclosing operation.
#[derive(Debug, Clone, Copy)]
pub struct ProgressState {
    pub phase: ProgressPhase,
    pub src_bank: u32,
    pub dst_bank: u32,
    pub lba_processed: u32,
    pub lba_total: u32,
}

/// Progress callback type. Called at least once per MiB processed and once
/// at completion; returning false cancels the operation.
pub type ProgressFn<'a> = dyn FnMut(&ProgressState) -> bool + 'a;

/// One bank of an RVT-H image, or the single pseudo-bank of a standalone
/// disc image.
pub struct BankEntry {
    pub(crate) index: u32,
    pub(crate) lba_start: u32,
    pub(crate) lba_len: u32,
    pub(crate) bank_type: BankType,
    pub(crate) region_code: u8,
    pub(crate) is_deleted: bool,
    pub(crate) crypto_type: CryptoType,
    pub(crate) sig_ticket: Option<SigStatus>,
    pub(crate) sig_tmd: Option<SigStatus>,
    pub(crate) ios_version: u8,
    pub(crate) timestamp: i64,
    pub(crate) disc_header: [u8; 512],
    pub(crate) ticket: Option<Ticket>,
    pub(crate) tmd: Option<Tmd>,
    pub(crate) ptbl: Option<PartitionTable>,
    pub(crate) import_tag: [u8; 8],
    pub(crate) reader: Option<Reader>,
}

impl BankEntry {
    fn new(index: u32, lba_start: u32, lba_len: u32, bank_type: BankType) -> BankEntry {
        BankEntry {
            index,
            lba_start,
            lba_len,
            bank_type,
            region_code: 0,
            is_deleted: false,
            crypto_type: CryptoType::Unknown,
            sig_ticket: None,
            sig_tmd: None,
            ios_version: 0,
            timestamp: -1,
            disc_header: [0u8; 512],
            ticket: None,
            tmd: None,
            ptbl: None,
            import_tag: [0u8; 8],
            reader: None,
        }
    }

    fn dl_bank2(index: u32) -> BankEntry {
        BankEntry::new(index, 0, 0, BankType::WiiDLBank2)
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn bank_type(&self) -> BankType {
        self.bank_type
    }

    pub fn lba_start(&self) -> u32 {
        self.lba_start
    }

    pub fn lba_len(&self) -> u32 {
        self.lba_len
    }

    pub fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    pub fn crypto_type(&self) -> CryptoType {
        self.crypto_type
    }

    pub fn sig_status_ticket(&self) -> Option<SigStatus> {
        self.sig_ticket
    }

    pub fn sig_status_tmd(&self) -> Option<SigStatus> {
        self.sig_tmd
    }

    pub fn ios_version(&self) -> u8 {
        self.ios_version
    }

    /// Unix timestamp of the bank, or -1 when the table carries none.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn region_code(&self) -> u8 {
        self.region_code
    }

    /// Gets whether this bank was imported by this tool without recryption.
    pub fn is_imported(&self) -> bool {
        self.import_tag == table::IMPORT_TAG
    }

    /// Gets the decoded game-partition ticket, when one was found.
    pub fn ticket(&self) -> Option<&Ticket> {
        self.ticket.as_ref()
    }

    /// Gets the decoded game-partition TMD, when one was found.
    pub fn tmd(&self) -> Option<&Tmd> {
        self.tmd.as_ref()
    }

    pub fn game_id(&self) -> String {
        DiscHeader::from_bytes(&self.disc_header)
            .map(|h| h.game_id())
            .unwrap_or_default()
    }

    pub fn game_title(&self) -> String {
        DiscHeader::from_bytes(&self.disc_header)
            .map(|h| h.game_title())
            .unwrap_or_default()
    }

    fn is_game(&self) -> bool {
        matches!(self.bank_type, BankType::Gcn | BankType::WiiSL | BankType::WiiDL)
    }

    /// Maps a non-extractable bank type onto its error.
    pub(crate) fn check_extractable(&self) -> Result<()> {
        match self.bank_type {
            BankType::Gcn | BankType::WiiSL | BankType::WiiDL => Ok(()),
            BankType::Empty => Err(RvtHError::BankEmpty),
            BankType::WiiDLBank2 => Err(RvtHError::BankDl2),
            BankType::Unknown => Err(RvtHError::BankUnknown),
        }
    }
}

/// An opened RVT-H HDD image or standalone disc image.
pub struct RvtH {
    pub(crate) file: RefFile,
    pub(crate) entries: Vec<BankEntry>,
    pub(crate) bank_count: u32,
    pub(crate) is_hdd: bool,
}

impl RvtH {
    /// Opens an RVT-H HDD image, GameCube disc image, or Wii disc image.
    /// Files no larger than two banks are treated as standalone disc images;
    /// anything bigger must carry a bank table.
    pub fn open(path: &Path) -> Result<RvtH> {
        let file = RefFile::open(path)?;
        let size = file.size()?;
        if size == 0 {
            return Err(RvtHError::eio());
        }
        if size <= 2 * lba_to_bytes(NHCD_BANK_SIZE_LBA) {
            RvtH::open_gcm(file)
        } else {
            RvtH::open_hdd(file)
        }
    }

    /// Opens a standalone disc image as a single-bank engine.
    fn open_gcm(file: RefFile) -> Result<RvtH> {
        let mut reader = Reader::open(&file, 0, 0)?;
        if reader.lba_len() == 0 {
            return Err(RvtHError::eio());
        }
        let mut disc_header = [0u8; 512];
        reader.read(&mut disc_header, 0, 1)?;
        let header = DiscHeader::from_bytes(&disc_header)?;
        let mut bank_type = header.identify();
        if bank_type == BankType::WiiSL && reader.lba_len() > NHCD_BANK_WII_SL_SIZE_RVTR_LBA {
            // Too long for a single-layer image.
            bank_type = BankType::WiiDL;
        }
        let mut entry = BankEntry::new(0, reader.lba_start(), reader.lba_len(), bank_type);
        entry.disc_header = disc_header;
        if bank_type != BankType::Empty {
            entry.region_code = header.region_code();
        }
        if bank_type == BankType::Gcn {
            // GameCube images have no partition crypto.
            entry.crypto_type = CryptoType::None;
        }
        entry.reader = Some(reader);
        if matches!(bank_type, BankType::WiiSL | BankType::WiiDL) {
            RvtH::init_wii_crypto(&mut entry);
        }
        Ok(RvtH {
            file,
            entries: vec![entry],
            bank_count: 1,
            is_hdd: false,
        })
    }

    /// Opens an RVT-H HDD image through its bank table.
    fn open_hdd(file: RefFile) -> Result<RvtH> {
        let bank_count = table::load_header(&file)?;
        info!("NHCD bank table: {bank_count} banks");
        let mut entries: Vec<BankEntry> = Vec::with_capacity(bank_count as usize);
        for i in 0..bank_count {
            // The bank following a dual-layer image holds its second half.
            if matches!(entries.last(), Some(prev) if prev.bank_type == BankType::WiiDL) {
                entries.push(BankEntry::dl_bank2(i));
                continue;
            }
            let raw = table::load_entry(&file, i, bank_count)?;
            entries.push(RvtH::init_bank_entry(&file, i, raw, bank_count)?);
        }
        Ok(RvtH {
            file,
            entries,
            bank_count,
            is_hdd: true,
        })
    }

    /// Creates an empty standalone disc image of the given length as the
    /// destination of an extract.
    pub fn create_gcm(path: &Path, lba_len: u32) -> Result<RvtH> {
        let file = RefFile::create(path)?;
        let reader = Reader::open(&file, 0, lba_len)?;
        let mut entry = BankEntry::new(0, 0, lba_len, BankType::Empty);
        entry.reader = Some(reader);
        Ok(RvtH {
            file,
            entries: vec![entry],
            bank_count: 1,
            is_hdd: false,
        })
    }

    fn init_bank_entry(
        file: &RefFile,
        index: u32,
        raw: table::RawBankEntry,
        bank_count: u32,
    ) -> Result<BankEntry> {
        let stored_len = raw.lba_len;
        let lba_len = if stored_len == 0 {
            bank_size_lba(index, bank_count)
        } else {
            stored_len
        };
        let mut reader = Reader::open(file, raw.lba_start, lba_len)?;
        let mut disc_header = [0u8; 512];
        reader.read(&mut disc_header, 0, 1)?;
        let header = DiscHeader::from_bytes(&disc_header)?;

        let mut bank_type = raw.bank_type;
        let mut is_deleted = false;
        if raw.bank_type == BankType::Empty {
            // An "empty" bank whose slot still has a disc header is a
            // deleted image.
            let found = header.identify();
            if found != BankType::Empty {
                bank_type = found;
                if found == BankType::WiiSL
                    && stored_len > NHCD_BANK_WII_SL_SIZE_RVTR_LBA
                {
                    bank_type = BankType::WiiDL;
                }
                is_deleted = true;
            }
        }

        let mut entry = BankEntry::new(index, raw.lba_start, lba_len, bank_type);
        entry.is_deleted = is_deleted;
        entry.timestamp = raw.timestamp;
        entry.import_tag = raw.import_tag;
        entry.disc_header = disc_header;
        if entry.is_game() {
            entry.region_code = header.region_code();
        }
        if bank_type == BankType::Gcn {
            entry.crypto_type = CryptoType::None;
        }
        entry.reader = Some(reader);
        if matches!(bank_type, BankType::WiiSL | BankType::WiiDL) {
            RvtH::init_wii_crypto(&mut entry);
        }
        Ok(entry)
    }

    /// Loads the partition table and game partition security data for a Wii
    /// bank. Failures leave the crypto fields unknown rather than failing
    /// the open; the bank may still be extracted raw.
    pub(crate) fn init_wii_crypto(entry: &mut BankEntry) {
        let Some(reader) = entry.reader.as_mut() else {
            return;
        };
        let ptbl = match PartitionTable::load(reader) {
            Ok(ptbl) => ptbl,
            Err(e) => {
                warn!("bank {}: unreadable partition table: {e}", entry.index + 1);
                return;
            }
        };
        let Some(game) = ptbl.find_game().copied() else {
            warn!("bank {}: no game partition", entry.index + 1);
            entry.ptbl = Some(ptbl);
            return;
        };
        match PartitionHeader::load(reader, game.lba_start) {
            Ok(ph) => {
                let chain = ph.cert_chain();
                let sig_ticket = sig_verify(&ph.raw[..TICKET_SIZE], chain.as_ref());
                let sig_tmd = sig_verify(ph.tmd_bytes(), chain.as_ref());
                entry.sig_ticket = Some(sig_ticket);
                entry.sig_tmd = Some(sig_tmd);
                if let Ok(tmd) = ph.parse_tmd() {
                    entry.ios_version = tmd.ios_version();
                    entry.tmd = Some(tmd);
                }
                entry.crypto_type = if entry.disc_header[DISC_FLAG_NO_CRYPTO] != 0 {
                    CryptoType::None
                } else {
                    let crypto = ph.ticket.crypto_type();
                    if crypto == CryptoType::Debug
                        && sig_ticket == SigStatus::Ok
                        && sig_tmd == SigStatus::Ok
                    {
                        CryptoType::DebugRealSigned
                    } else {
                        crypto
                    }
                };
                entry.ticket = Some(ph.ticket);
            }
            Err(e) => {
                warn!("bank {}: unreadable partition header: {e}", entry.index + 1);
            }
        }
        entry.ptbl = Some(ptbl);
    }

    /// Gets whether this is an HDD image rather than a standalone disc image.
    pub fn is_hdd(&self) -> bool {
        self.is_hdd
    }

    /// Gets the number of banks.
    pub fn bank_count(&self) -> u32 {
        self.bank_count
    }

    /// Gets a bank table entry, bounds-checked.
    pub fn bank(&self, bank: usize) -> Result<&BankEntry> {
        self.entries.get(bank).ok_or(RvtHError::BankOutOfRange)
    }

    /// Iterates over every bank entry.
    pub fn banks(&self) -> impl Iterator<Item = &BankEntry> {
        self.entries.iter()
    }

    /// Promotes the backing file to read-write. Every mutating operation
    /// calls this first.
    pub fn make_writable(&mut self) -> Result<()> {
        self.file.make_writable()?;
        Ok(())
    }

    /// Persists one bank's table entry. Only meaningful on HDD images.
    pub(crate) fn write_bank_entry(&self, bank: usize) -> Result<()> {
        if !self.is_hdd {
            return Err(RvtHError::NotHddImage);
        }
        table::write_entry(&self.file, bank as u32, &self.entries[bank])
    }

    /// Marks a bank as deleted. The image itself is left in place, so the
    /// bank can be undeleted until something overwrites it. Dual-layer
    /// images toggle both banks of the pair.
    pub fn delete_bank(&mut self, bank: usize) -> Result<()> {
        if !self.is_hdd {
            return Err(RvtHError::NotHddImage);
        }
        let entry = self.entries.get(bank).ok_or(RvtHError::BankOutOfRange)?;
        entry.check_extractable()?;
        if entry.is_deleted {
            return Err(RvtHError::BankIsDeleted);
        }
        self.make_writable()?;
        let is_dl = self.entries[bank].bank_type == BankType::WiiDL;
        self.entries[bank].is_deleted = true;
        if is_dl {
            self.entries[bank + 1].is_deleted = true;
        }
        info!("deleted bank {}", bank + 1);
        self.write_bank_entry(bank)
    }

    /// Restores a deleted bank.
    pub fn undelete_bank(&mut self, bank: usize) -> Result<()> {
        if !self.is_hdd {
            return Err(RvtHError::NotHddImage);
        }
        let entry = self.entries.get(bank).ok_or(RvtHError::BankOutOfRange)?;
        entry.check_extractable()?;
        if !entry.is_deleted {
            return Err(RvtHError::BankNotDeleted);
        }
        self.make_writable()?;
        let is_dl = self.entries[bank].bank_type == BankType::WiiDL;
        self.entries[bank].is_deleted = false;
        if is_dl {
            self.entries[bank + 1].is_deleted = false;
        }
        info!("undeleted bank {}", bank + 1);
        self.write_bank_entry(bank)
    }
}
