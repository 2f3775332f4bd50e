// disc/header.rs from rustrvth (c) 2025 NinjaCheetah & Contributors
// https://github.com/NinjaCheetah/rustrvth
//
// Implements parsing and identification of GameCube/Wii disc headers.

use std::io::{Cursor, Read, Seek, SeekFrom};
use byteorder::{BigEndian, ReadBytesExt};
use crate::hdd::BankType;

/// Magic number at offset 0x18 identifying a Wii disc.
pub const WII_MAGIC: u32 = 0x5D1C9EA3;
/// Magic number at offset 0x1C identifying a GameCube disc.
pub const GCN_MAGIC: u32 = 0xC2339F3D;

/// The decoded fields of the first 512 bytes of a disc image.
#[derive(Debug, Clone)]
pub struct DiscHeader {
    disc_id: [u8; 6],
    disc_number: u8,
    disc_version: u8,
    magic_wii: u32,
    magic_gcn: u32,
    game_title: [u8; 64],
}

impl DiscHeader {
    /// Creates a new DiscHeader instance from the first block of a disc
    /// image. At least 0x60 bytes are required.
    pub fn from_bytes(data: &[u8]) -> Result<Self, std::io::Error> {
        let mut buf = Cursor::new(data);
        let mut disc_id = [0u8; 6];
        buf.read_exact(&mut disc_id)?;
        let disc_number = buf.read_u8()?;
        let disc_version = buf.read_u8()?;
        buf.seek(SeekFrom::Start(0x18))?;
        let magic_wii = buf.read_u32::<BigEndian>()?;
        let magic_gcn = buf.read_u32::<BigEndian>()?;
        let mut game_title = [0u8; 64];
        buf.read_exact(&mut game_title)?;
        Ok(DiscHeader {
            disc_id,
            disc_number,
            disc_version,
            magic_wii,
            magic_gcn,
            game_title,
        })
    }

    pub fn is_wii(&self) -> bool {
        self.magic_wii == WII_MAGIC
    }

    pub fn is_gcn(&self) -> bool {
        self.magic_gcn == GCN_MAGIC
    }

    /// Classifies the header. A header with neither magic set is an empty or
    /// zeroed bank; dual-layer promotion is done by the caller, which knows
    /// the image length.
    pub fn identify(&self) -> BankType {
        if self.is_wii() {
            BankType::WiiSL
        } else if self.is_gcn() {
            BankType::Gcn
        } else {
            BankType::Empty
        }
    }

    /// Gets the 6-character game ID as a string.
    pub fn game_id(&self) -> String {
        String::from_utf8_lossy(&self.disc_id).to_string()
    }

    /// Gets the game title, trimmed of NUL and space padding.
    pub fn game_title(&self) -> String {
        String::from_utf8_lossy(&self.game_title)
            .trim_end_matches(['\0', ' '])
            .to_owned()
    }

    /// Gets the raw region byte (the fourth character of the game ID).
    pub fn region_code(&self) -> u8 {
        self.disc_id[3]
    }

    pub fn disc_number(&self) -> u8 {
        self.disc_number
    }

    pub fn disc_version(&self) -> u8 {
        self.disc_version
    }
}

/// Gets a short region name for a disc region byte.
pub fn region_name(code: u8) -> &'static str {
    match code {
        b'J' => "JPN",
        b'E' => "USA",
        b'P' => "EUR",
        b'K' => "KOR",
        b'W' => "TWN",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wii_block() -> [u8; 512] {
        let mut block = [0u8; 512];
        block[..6].copy_from_slice(b"RZDE01");
        block[0x18..0x1C].copy_from_slice(&WII_MAGIC.to_be_bytes());
        block[0x20..0x2D].copy_from_slice(b"ZELDA SAMPLE\0");
        block
    }

    #[test]
    fn test_identify_wii() {
        let header = DiscHeader::from_bytes(&wii_block()).unwrap();
        assert_eq!(header.identify(), BankType::WiiSL);
        assert_eq!(header.game_id(), "RZDE01");
        assert_eq!(header.game_title(), "ZELDA SAMPLE");
        assert_eq!(region_name(header.region_code()), "USA");
    }

    #[test]
    fn test_identify_gcn() {
        let mut block = [0u8; 512];
        block[..6].copy_from_slice(b"GALP01");
        block[0x1C..0x20].copy_from_slice(&GCN_MAGIC.to_be_bytes());
        let header = DiscHeader::from_bytes(&block).unwrap();
        assert_eq!(header.identify(), BankType::Gcn);
        assert!(!header.is_wii());
    }

    #[test]
    fn test_identify_empty() {
        let header = DiscHeader::from_bytes(&[0u8; 512]).unwrap();
        assert_eq!(header.identify(), BankType::Empty);
    }
}
