//! A narrow MCUboot image header/TLV parser.
//!
//! This is the external-collaborator boundary the upgrade orchestrator uses
//! to learn a candidate image's version and content hash before uploading
//! it. It understands just enough of MCUboot's image format to extract
//! those two things; it is not a general-purpose image toolkit and does not
//! parse signature TLVs, multi-image manifests, or protected TLV contents.

use miette::Diagnostic;
use thiserror::Error;

const IMAGE_MAGIC: u32 = 0x96f3_b83d;
const IMAGE_HEADER_SIZE: usize = 32;
const TLV_INFO_MAGIC: u16 = 0x6907;
const TLV_INFO_SIZE: usize = 4;
const TLV_ENTRY_HEADER_SIZE: usize = 4;
const TLV_SHA256: u8 = 0x10;

/// Errors returned while parsing an MCUboot image.
#[derive(Error, Debug, Diagnostic)]
pub enum ImageParseError {
    /// The image is too short to contain a full header.
    #[error("image is too short to contain an MCUboot header")]
    #[diagnostic(code(smp_client::mcuboot::too_short))]
    TooShort,
    /// The header's magic number does not match MCUboot's.
    #[error("image does not start with the MCUboot magic number")]
    #[diagnostic(code(smp_client::mcuboot::bad_magic))]
    BadMagic,
    /// The TLV area immediately following the image body could not be found
    /// or has a bad magic number.
    #[error("TLV area magic number is invalid or missing")]
    #[diagnostic(code(smp_client::mcuboot::bad_tlv_magic))]
    BadTlvMagic,
    /// No SHA-256 hash TLV was present in the TLV area.
    #[error("no SHA-256 hash TLV found in the image")]
    #[diagnostic(code(smp_client::mcuboot::missing_hash))]
    MissingHash,
    /// A SHA-256 hash TLV was present but was not exactly 32 bytes long.
    #[error("SHA-256 hash TLV has length {0}, expected 32")]
    #[diagnostic(code(smp_client::mcuboot::bad_hash_length))]
    BadHashLength(usize),
}

/// The fixed fields of an MCUboot image header, decoded from the first 32 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHeader {
    /// Address the image expects to be loaded at.
    pub load_addr: u32,
    /// Size of this header, in bytes, before the image body starts.
    pub header_size: u16,
    /// Size of the "protected" TLV area, included at the start of the TLV region.
    pub protected_tlv_size: u16,
    /// Size of the image body, excluding header and TLVs.
    pub image_size: u32,
    /// Image flags bitfield.
    pub flags: u32,
    /// Image version, as set by `imgtool`.
    pub version: ImageVersion,
}

/// An MCUboot image version (`major.minor.revision+build`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageVersion {
    /// Major version component.
    pub major: u8,
    /// Minor version component.
    pub minor: u8,
    /// Revision component.
    pub revision: u16,
    /// Build number component.
    pub build_num: u32,
}

impl std::fmt::Display for ImageVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}+{}", self.major, self.minor, self.revision, self.build_num)
    }
}

/// What the upgrade orchestrator needs to know about a candidate image:
/// its version string and the SHA-256 hash MCUmgr uses to identify it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    /// The image's version, as set by `imgtool`.
    pub version: ImageVersion,
    /// The SHA-256 hash TLV MCUmgr uses to identify the upload/active image.
    pub hash: [u8; 32],
}

/// Parses just the fixed 32-byte MCUboot header, without touching the TLV area.
pub fn parse_image_header(data: &[u8]) -> Result<ImageHeader, ImageParseError> {
    if data.len() < IMAGE_HEADER_SIZE {
        return Err(ImageParseError::TooShort);
    }

    let magic = u32::from_le_bytes(data[0..4].try_into().unwrap());
    if magic != IMAGE_MAGIC {
        return Err(ImageParseError::BadMagic);
    }

    let load_addr = u32::from_le_bytes(data[4..8].try_into().unwrap());
    let header_size = u16::from_le_bytes(data[8..10].try_into().unwrap());
    let protected_tlv_size = u16::from_le_bytes(data[10..12].try_into().unwrap());
    let image_size = u32::from_le_bytes(data[12..16].try_into().unwrap());
    let flags = u32::from_le_bytes(data[16..20].try_into().unwrap());
    let version = ImageVersion {
        major: data[20],
        minor: data[21],
        revision: u16::from_le_bytes(data[22..24].try_into().unwrap()),
        build_num: u32::from_le_bytes(data[24..28].try_into().unwrap()),
    };

    Ok(ImageHeader {
        load_addr,
        header_size,
        protected_tlv_size,
        image_size,
        flags,
        version,
    })
}

/// Parses the header and walks the TLV area to find the image's SHA-256 hash.
pub fn get_image_info(data: &[u8]) -> Result<ImageInfo, ImageParseError> {
    let header = parse_image_header(data)?;

    let tlv_area_offset =
        header.header_size as usize + header.image_size as usize + header.protected_tlv_size as usize;
    if data.len() < tlv_area_offset + TLV_INFO_SIZE {
        return Err(ImageParseError::BadTlvMagic);
    }

    let tlv_magic = u16::from_le_bytes(
        data[tlv_area_offset..tlv_area_offset + 2]
            .try_into()
            .unwrap(),
    );
    if tlv_magic != TLV_INFO_MAGIC {
        return Err(ImageParseError::BadTlvMagic);
    }
    let tlv_area_len = u16::from_le_bytes(
        data[tlv_area_offset + 2..tlv_area_offset + 4]
            .try_into()
            .unwrap(),
    ) as usize;

    let mut cursor = tlv_area_offset + TLV_INFO_SIZE;
    let tlv_area_end = tlv_area_offset + tlv_area_len;

    while cursor + TLV_ENTRY_HEADER_SIZE <= tlv_area_end && cursor + TLV_ENTRY_HEADER_SIZE <= data.len() {
        let tlv_type = data[cursor];
        let tlv_len = u16::from_le_bytes(data[cursor + 2..cursor + 4].try_into().unwrap()) as usize;
        let value_start = cursor + TLV_ENTRY_HEADER_SIZE;
        let value_end = value_start + tlv_len;

        if tlv_type == TLV_SHA256 {
            if tlv_len != 32 {
                return Err(ImageParseError::BadHashLength(tlv_len));
            }
            if value_end > data.len() {
                return Err(ImageParseError::TooShort);
            }
            let hash: [u8; 32] = data[value_start..value_end].try_into().unwrap();
            return Ok(ImageInfo {
                version: header.version,
                hash,
            });
        }

        cursor = value_end;
    }

    Err(ImageParseError::MissingHash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha2::{Digest, Sha256};

    fn build_image(body: &[u8], version: ImageVersion, include_hash: bool) -> Vec<u8> {
        let mut image = Vec::new();
        image.extend_from_slice(&IMAGE_MAGIC.to_le_bytes());
        image.extend_from_slice(&0u32.to_le_bytes()); // load_addr
        image.extend_from_slice(&(IMAGE_HEADER_SIZE as u16).to_le_bytes());
        image.extend_from_slice(&0u16.to_le_bytes()); // protected_tlv_size
        image.extend_from_slice(&(body.len() as u32).to_le_bytes());
        image.extend_from_slice(&0u32.to_le_bytes()); // flags
        image.push(version.major);
        image.push(version.minor);
        image.extend_from_slice(&version.revision.to_le_bytes());
        image.extend_from_slice(&version.build_num.to_le_bytes());
        image.extend_from_slice(&0u32.to_le_bytes()); // pad
        image.extend_from_slice(body);

        let hash: [u8; 32] = Sha256::digest(&image).into();

        let mut tlvs = Vec::new();
        if include_hash {
            tlvs.push(TLV_SHA256);
            tlvs.push(0); // pad
            tlvs.extend_from_slice(&32u16.to_le_bytes());
            tlvs.extend_from_slice(&hash);
        }

        image.extend_from_slice(&TLV_INFO_MAGIC.to_le_bytes());
        image.extend_from_slice(&((TLV_INFO_SIZE + tlvs.len()) as u16).to_le_bytes());
        image.extend_from_slice(&tlvs);

        image
    }

    #[test]
    fn parses_header_and_hash() {
        let version = ImageVersion {
            major: 1,
            minor: 2,
            revision: 3,
            build_num: 4,
        };
        let image = build_image(&[0xAA; 64], version, true);

        let info = get_image_info(&image).unwrap();
        assert_eq!(info.version, version);

        let header = parse_image_header(&image).unwrap();
        assert_eq!(header.image_size, 64);
        assert_eq!(header.version, version);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut image = vec![0u8; 64];
        image[0] = 0xFF;
        assert!(matches!(
            parse_image_header(&image),
            Err(ImageParseError::BadMagic)
        ));
    }

    #[test]
    fn rejects_too_short_input() {
        assert!(matches!(
            parse_image_header(&[0u8; 10]),
            Err(ImageParseError::TooShort)
        ));
    }

    #[test]
    fn reports_missing_hash_tlv() {
        let version = ImageVersion {
            major: 0,
            minor: 1,
            revision: 0,
            build_num: 0,
        };
        let image = build_image(&[0xAA; 16], version, false);
        assert!(matches!(
            get_image_info(&image),
            Err(ImageParseError::MissingHash)
        ));
    }

    #[test]
    fn version_display_format() {
        let version = ImageVersion {
            major: 1,
            minor: 2,
            revision: 3,
            build_num: 4,
        };
        assert_eq!(version.to_string(), "1.2.3+4");
    }
}
