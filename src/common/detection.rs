//! Container detection by magic bytes.

/// The two container families this crate reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    /// OLE2 compound file, the legacy `.xls` wrapper.
    Ole,
    /// ZIP/OPC package, the modern `.xlsx` wrapper.
    Zip,
}

const OLE_MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

/// Sniff the container family from the leading bytes. Empty or unrecognized
/// input yields `None`; extensions and MIME types are never consulted.
pub fn detect(data: &[u8]) -> Option<Container> {
    if data.len() >= OLE_MAGIC.len() && data[..OLE_MAGIC.len()] == OLE_MAGIC {
        Some(Container::Ole)
    } else if data.len() >= ZIP_MAGIC.len() && data[..ZIP_MAGIC.len()] == ZIP_MAGIC {
        Some(Container::Zip)
    } else {
        None
    }
}
