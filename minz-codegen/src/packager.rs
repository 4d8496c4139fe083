//! Output file format packagers (component H, spec.md §4.6/§6).

use crate::error::{CodegenError, CodegenResult};
use crate::target_config::{RawImage, TargetConfig};

/// Size in bytes of a `.SNA` snapshot: 27-byte header + 48 KiB memory image.
pub const SNA_SIZE: usize = 27 + 48 * 1024;

/// Identity packager: returns the raw bytes unchanged.
pub fn raw(_cfg: &TargetConfig, image: &RawImage) -> CodegenResult<Vec<u8>> {
    Ok(image.bytes.clone())
}

/// ZX Spectrum `.SNA` snapshot packager.
///
/// The header matches spec.md §6 exactly: `I=0x3F; HL'=0x5258; DE'=0;
/// BC'=0; AF'=0; HL=origin; DE=0; BC=0; IY=0; IX=0; IFF2=0; R=0; AF=0;
/// SP=0xFFFF; IM=1; border=7`, followed by a 48 KiB memory image with the
/// code placed at `origin - 0x4000` and zeros elsewhere.
pub fn sna(_cfg: &TargetConfig, image: &RawImage) -> CodegenResult<Vec<u8>> {
    if image.origin < 0x4000 {
        return Err(CodegenError::MemoryLayout(format!(
            "SNA origin {:#06x} is below the 48K RAM base 0x4000",
            image.origin
        )));
    }
    let offset = (image.origin - 0x4000) as usize;
    if offset + image.bytes.len() > 48 * 1024 {
        return Err(CodegenError::MemoryLayout(format!(
            "SNA image of {} bytes at origin {:#06x} overflows 48K RAM",
            image.bytes.len(),
            image.origin
        )));
    }

    let mut out = Vec::with_capacity(SNA_SIZE);
    out.push(0x3F); // I
    out.extend_from_slice(&[0x58, 0x52]); // HL' = 0x5258, LE
    out.extend_from_slice(&[0x00, 0x00]); // DE'
    out.extend_from_slice(&[0x00, 0x00]); // BC'
    out.extend_from_slice(&[0x00, 0x00]); // AF'
    out.extend_from_slice(&image.origin.to_le_bytes()); // HL = origin
    out.extend_from_slice(&[0x00, 0x00]); // DE
    out.extend_from_slice(&[0x00, 0x00]); // BC
    out.extend_from_slice(&[0x00, 0x00]); // IY
    out.extend_from_slice(&[0x00, 0x00]); // IX
    out.push(0x00); // IFF2
    out.push(0x00); // R
    out.extend_from_slice(&[0x00, 0x00]); // AF
    out.extend_from_slice(&0xFFFFu16.to_le_bytes()); // SP
    out.push(0x01); // IM
    out.push(0x07); // border

    debug_assert_eq!(out.len(), 27);

    let mut mem = vec![0u8; 48 * 1024];
    mem[offset..offset + image.bytes.len()].copy_from_slice(&image.bytes);
    out.extend_from_slice(&mem);

    debug_assert_eq!(out.len(), SNA_SIZE);
    Ok(out)
}

fn xor_checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc ^ b)
}

fn tap_block(flag: u8, mut payload: Vec<u8>) -> Vec<u8> {
    let mut body = vec![flag];
    body.append(&mut payload);
    let checksum = xor_checksum(&body);
    body.push(checksum);
    let mut block = (body.len() as u16).to_le_bytes().to_vec();
    block.extend_from_slice(&body);
    block
}

/// ZX Spectrum `.TAP` tape packager: a header block followed by a data
/// block, each length-prefixed (spec.md §4.6/§6).
pub fn tap(_cfg: &TargetConfig, image: &RawImage) -> CodegenResult<Vec<u8>> {
    let mut filename = [b' '; 10];
    let name = b"MINZ";
    filename[..name.len()].copy_from_slice(name);

    let mut header_payload = vec![0x03]; // type = 3, machine code
    header_payload.extend_from_slice(&filename);
    header_payload.extend_from_slice(&(image.bytes.len() as u16).to_le_bytes()); // data length
    header_payload.extend_from_slice(&image.origin.to_le_bytes()); // start address
    header_payload.extend_from_slice(&(image.bytes.len() as u16).to_le_bytes()); // "unused" = data length

    let mut out = tap_block(0x00, header_payload);
    out.extend(tap_block(0xFF, image.bytes.clone()));
    Ok(out)
}

/// CP/M `.COM` packager: raw bytes, origin pinned to `0x0100`, maximum
/// ~64000 bytes (spec.md §3/§6).
pub fn com(_cfg: &TargetConfig, image: &RawImage) -> CodegenResult<Vec<u8>> {
    if image.origin != 0x0100 {
        return Err(CodegenError::MemoryLayout(format!(
            "CP/M .COM must be assembled at origin 0x0100, got {:#06x}",
            image.origin
        )));
    }
    if image.bytes.len() > 64000 {
        return Err(CodegenError::MemoryLayout(format!(
            ".COM program of {} bytes exceeds the ~64000 byte limit",
            image.bytes.len()
        )));
    }
    Ok(image.bytes.clone())
}

/// MSX ROM packager: size rounded up to the next power of two in
/// `[8192, 32768]`; if `origin == 0x8000`, the first 16 bytes are
/// overwritten with the cartridge header (spec.md §4.6/§6).
pub fn msx_rom(_cfg: &TargetConfig, image: &RawImage) -> CodegenResult<Vec<u8>> {
    let min_size = 8192usize;
    let max_size = 32768usize;
    if image.bytes.len() > max_size {
        return Err(CodegenError::OutputFormat(format!(
            "MSX ROM image of {} bytes exceeds the 32 KiB maximum",
            image.bytes.len()
        )));
    }
    let mut size = min_size;
    while size < image.bytes.len() {
        size *= 2;
    }

    let mut out = vec![0u8; size];
    out[..image.bytes.len()].copy_from_slice(&image.bytes);

    if image.origin == 0x8000 {
        out[0] = b'A';
        out[1] = b'B';
        out[2..4].copy_from_slice(&image.origin.to_le_bytes());
        for b in &mut out[4..16] {
            *b = 0;
        }
    }
    Ok(out)
}

/// Warnings (never fatal) produced by [`validate_memory_layout`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LayoutWarning {
    /// The image overlaps the target's screen/video memory.
    OverlapsScreen,
    /// The image lies below the target's RAM start (in ROM/BASIC area).
    BelowRam,
    /// The image overlaps a reserved platform symbol's address (e.g.
    /// CP/M's BDOS entry point).
    CollidesWithSymbol(&'static str, i64),
}

/// Non-fatal memory-layout validation (spec.md §4.6: "warns, not fatals").
pub fn validate_memory_layout(cfg: &TargetConfig, image: &RawImage) -> Vec<LayoutWarning> {
    let mut warnings = Vec::new();
    let len = image.bytes.len() as u32;

    if cfg.overlaps_screen(image.origin, len) {
        warnings.push(LayoutWarning::OverlapsScreen);
    }
    if cfg.below_ram(image.origin, len) {
        warnings.push(LayoutWarning::BelowRam);
    }
    for (name, addr) in cfg.standard_symbols {
        let addr = *addr;
        if addr >= 0 && (addr as u32) >= image.origin as u32 && (addr as u32) < image.origin as u32 + len {
            warnings.push(LayoutWarning::CollidesWithSymbol(name, addr));
        }
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_cfg() -> TargetConfig {
        TargetConfig {
            name: "test",
            file_extension: ".bin",
            default_origin: 0x8000,
            ram_start: 0x4000,
            ram_size: 0xC000,
            rom_start: None,
            rom_size: None,
            screen_base: Some(0x4000),
            stack_top: 0xFFFF,
            standard_symbols: &[],
            packager: raw,
        }
    }

    #[test]
    fn sna_is_exactly_49179_bytes() {
        let cfg = dummy_cfg();
        let image = RawImage { bytes: vec![0x00], origin: 0x8000 };
        let out = sna(&cfg, &image).unwrap();
        assert_eq!(out.len(), SNA_SIZE);
        assert_eq!(out.len(), 49_179);
    }

    #[test]
    fn sna_header_matches_spec() {
        let cfg = dummy_cfg();
        let image = RawImage { bytes: vec![], origin: 0x8000 };
        let out = sna(&cfg, &image).unwrap();
        assert_eq!(out[0], 0x3F); // I
        assert_eq!(&out[1..3], &[0x58, 0x52]); // HL'
        assert_eq!(&out[11..13], &0x8000u16.to_le_bytes()); // HL = origin
        assert_eq!(&out[23..25], &0xFFFFu16.to_le_bytes()); // SP
        assert_eq!(out[25], 0x01); // IM
        assert_eq!(out[26], 0x07); // border
    }

    #[test]
    fn com_requires_origin_0100() {
        let cfg = dummy_cfg();
        let image = RawImage { bytes: vec![0x00], origin: 0x8000 };
        assert!(com(&cfg, &image).is_err());
        let image = RawImage { bytes: vec![0x00], origin: 0x0100 };
        assert!(com(&cfg, &image).is_ok());
    }

    #[test]
    fn msx_rom_rounds_up_and_patches_header() {
        let cfg = dummy_cfg();
        let image = RawImage { bytes: vec![0xAA; 100], origin: 0x8000 };
        let out = msx_rom(&cfg, &image).unwrap();
        assert_eq!(out.len(), 8192);
        assert_eq!(out[0], b'A');
        assert_eq!(out[1], b'B');
        assert_eq!(&out[2..4], &0x8000u16.to_le_bytes());
    }

    #[test]
    fn msx_rom_minimum_is_8kib() {
        let cfg = dummy_cfg();
        let image = RawImage { bytes: vec![0x00; 1], origin: 0x0000 };
        let out = msx_rom(&cfg, &image).unwrap();
        assert_eq!(out.len(), 8192);
    }

    #[test]
    fn tap_blocks_are_length_prefixed() {
        let cfg = dummy_cfg();
        let image = RawImage { bytes: vec![0x01, 0x02, 0x03], origin: 0x8000 };
        let out = tap(&cfg, &image).unwrap();
        let header_len = u16::from_le_bytes([out[0], out[1]]) as usize;
        assert_eq!(header_len, 19); // flag + 18-byte payload + checksum
        let data_start = 2 + header_len;
        let data_len = u16::from_le_bytes([out[data_start], out[data_start + 1]]) as usize;
        assert_eq!(data_len, 1 + 3 + 1); // flag + payload + checksum
    }
}
