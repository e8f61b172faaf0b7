//! Provider byte encoding for spatial values.
//!
//! Domain objects hold spatial values as raw WKB payloads; the provider
//! encoding prepends a subtype tag and the spatial reference identifier so
//! the destination can reconstruct the typed value. Layout: one tag byte
//! (geography = 1, geometry = 2), the SRID as a little-endian `i32`, then the
//! WKB payload.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::bail;
use crate::error::{BulkResult, ErrorKind};

const TAG_GEOGRAPHY: u8 = 1;
const TAG_GEOMETRY: u8 = 2;

/// Geography vs geometry subtype of a spatial column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpatialKind {
    /// Ellipsoidal (round-earth) data.
    Geography,
    /// Planar (flat-earth) data.
    Geometry,
}

/// Encodes a WKB payload into the provider byte encoding.
pub fn encode(kind: SpatialKind, srid: i32, wkb: &[u8]) -> Vec<u8> {
    let mut encoded = Vec::with_capacity(1 + 4 + wkb.len());

    let tag = match kind {
        SpatialKind::Geography => TAG_GEOGRAPHY,
        SpatialKind::Geometry => TAG_GEOMETRY,
    };
    encoded.push(tag);
    encoded
        .write_i32::<LittleEndian>(srid)
        .expect("writing to a Vec cannot fail");
    encoded.extend_from_slice(wkb);

    encoded
}

/// Decodes a provider-encoded spatial value back into subtype, SRID, and WKB.
pub fn decode(bytes: &[u8]) -> BulkResult<(SpatialKind, i32, Vec<u8>)> {
    if bytes.len() < 5 {
        bail!(
            ErrorKind::ConversionError,
            "Spatial value is too short to carry a tag and SRID",
            detail = format!("{} bytes", bytes.len())
        );
    }

    let kind = match bytes[0] {
        TAG_GEOGRAPHY => SpatialKind::Geography,
        TAG_GEOMETRY => SpatialKind::Geometry,
        other => bail!(
            ErrorKind::ConversionError,
            "Unknown spatial subtype tag",
            detail = format!("tag {other}")
        ),
    };

    let mut srid_bytes = &bytes[1..5];
    let srid = srid_bytes
        .read_i32::<LittleEndian>()
        .expect("slice is exactly four bytes");

    Ok((kind, srid, bytes[5..].to_vec()))
}
