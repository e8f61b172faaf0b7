//! Provider byte encoding for hierarchical path values.
//!
//! Domain objects hold hierarchy positions as textual materialized paths like
//! `/1/2.1/3/`. The provider encoding is binary: a little-endian `u16` level
//! count, then per level a `u8` component count followed by the components as
//! little-endian `i64`s. The root path `/` encodes as zero levels.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::bail;
use crate::error::{BulkResult, ErrorKind};

/// Encodes a textual materialized path into the provider byte encoding.
pub fn encode_path(path: &str) -> BulkResult<Vec<u8>> {
    let levels = parse_levels(path)?;
    if levels.len() > u16::MAX as usize {
        bail!(
            ErrorKind::ConversionError,
            "Hierarchy path has too many levels",
            detail = format!("{} levels", levels.len())
        );
    }

    let mut encoded = Vec::new();
    encoded
        .write_u16::<LittleEndian>(levels.len() as u16)
        .expect("writing to a Vec cannot fail");

    for level in &levels {
        encoded.push(level.len() as u8);
        for component in level {
            encoded
                .write_i64::<LittleEndian>(*component)
                .expect("writing to a Vec cannot fail");
        }
    }

    Ok(encoded)
}

/// Decodes a provider-encoded hierarchy value back into its textual path.
pub fn decode_path(bytes: &[u8]) -> BulkResult<String> {
    let mut cursor = bytes;

    let level_count = cursor.read_u16::<LittleEndian>().map_err(|_| {
        crate::bulk_error!(
            ErrorKind::ConversionError,
            "Hierarchy value is too short to carry a level count"
        )
    })?;

    let mut path = String::from("/");
    for _ in 0..level_count {
        let component_count = cursor.read_u8().map_err(|_| {
            crate::bulk_error!(
                ErrorKind::ConversionError,
                "Hierarchy value truncated at a level header"
            )
        })?;

        let mut components = Vec::with_capacity(component_count as usize);
        for _ in 0..component_count {
            let component = cursor.read_i64::<LittleEndian>().map_err(|_| {
                crate::bulk_error!(
                    ErrorKind::ConversionError,
                    "Hierarchy value truncated inside a level"
                )
            })?;
            components.push(component.to_string());
        }

        path.push_str(&components.join("."));
        path.push('/');
    }

    Ok(path)
}

/// Parses `/1/2.1/` into its per-level integer components.
fn parse_levels(path: &str) -> BulkResult<Vec<Vec<i64>>> {
    if !path.starts_with('/') || !path.ends_with('/') {
        bail!(
            ErrorKind::ConversionError,
            "Hierarchy path must start and end with '/'",
            detail = path.to_string()
        );
    }

    let inner = &path[1..path.len() - 1];
    if inner.is_empty() {
        return Ok(Vec::new());
    }

    let mut levels = Vec::new();
    for segment in inner.split('/') {
        let mut components = Vec::new();
        for component in segment.split('.') {
            let parsed = component.parse::<i64>().map_err(|_| {
                crate::bulk_error!(
                    ErrorKind::ConversionError,
                    "Hierarchy path component is not an integer",
                    detail = format!("segment '{segment}' in path '{path}'")
                )
            })?;
            components.push(parsed);
        }

        if components.len() > u8::MAX as usize {
            bail!(
                ErrorKind::ConversionError,
                "Hierarchy level has too many components",
                detail = format!("segment '{segment}'")
            );
        }

        levels.push(components);
    }

    Ok(levels)
}
