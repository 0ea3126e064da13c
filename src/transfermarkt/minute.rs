//! Event minutes are not printed as text on match pages. Each event carries a
//! clock sprite whose CSS background offset selects a tile: the column is the
//! minute within a block of ten, the row is the block. Stoppage time is
//! written over the sprite as extra digits.

use regex::Regex;
use std::sync::LazyLock;

/// Edge of one sprite tile in pixels
const TILE_PX: u32 = 36;

/// Last tile of the sprite: end of extra time
const LAST_TILE_MINUTE: i32 = 120;

/// Longest stoppage time written over a tile
const MAX_STOPPAGE: i32 = 30;

static OFFSET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(-?\d+)px").expect("valid offset pattern"));

/// Decode a minute from both sprite offsets and the overlay text.
/// Missing either offset makes the minute undecodable, and so does an offset
/// past the last tile or an impossible stoppage time.
pub fn decode_minute(x: Option<i32>, y: Option<i32>, overlay: &str) -> Option<i32> {
    let (x, y) = (x?, y?);
    let x_tile = x.unsigned_abs() / TILE_PX;
    let y_tile = y.unsigned_abs() / TILE_PX;
    if x_tile > 9 {
        return None;
    }
    let base = i32::try_from(1 + x_tile + 10 * y_tile).ok()?;
    if base > LAST_TILE_MINUTE {
        return None;
    }
    match overlay.trim().parse::<i32>() {
        Ok(extra) if (0..=MAX_STOPPAGE).contains(&extra) => Some(base + extra),
        Ok(_) => None,
        Err(_) => Some(base),
    }
}

/// First two pixel offsets of an inline `background-position` style.
pub fn sprite_offsets(style: &str) -> (Option<i32>, Option<i32>) {
    let mut offsets = OFFSET_RE
        .captures_iter(style)
        .map(|c| c[1].parse::<i32>().ok());
    let x = offsets.next().flatten();
    let y = if x.is_some() { offsets.next().flatten() } else { None };
    (x, y)
}

/// Minute shown by a clock sprite element, from its style and text.
pub fn minute_from_sprite(style: &str, overlay: &str) -> Option<i32> {
    let (x, y) = sprite_offsets(style);
    decode_minute(x, y, overlay)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_tiles() {
        // first tile is minute 1
        assert_eq!(decode_minute(Some(0), Some(0), ""), Some(1));
        assert_eq!(decode_minute(Some(-36), Some(0), ""), Some(2));
        assert_eq!(decode_minute(Some(-324), Some(0), ""), Some(10));
        assert_eq!(decode_minute(Some(-72), Some(-216), ""), Some(63));
        assert_eq!(decode_minute(Some(-324), Some(-288), ""), Some(90));
    }

    #[test]
    fn test_overlay_adds_stoppage_time() {
        assert_eq!(decode_minute(Some(-324), Some(-288), "+3"), Some(93));
        assert_eq!(decode_minute(Some(-324), Some(-288), " 2 "), Some(92));
        assert_eq!(decode_minute(Some(-324), Some(-288), "\u{a0}"), Some(90));
        assert_eq!(decode_minute(Some(-324), Some(-288), "abc"), Some(90));
    }

    #[test]
    fn test_missing_axis_is_undecodable() {
        assert_eq!(decode_minute(None, Some(-36), ""), None);
        assert_eq!(decode_minute(Some(-36), None, "5"), None);
        assert_eq!(minute_from_sprite("background-position: -36px;", ""), None);
        assert_eq!(minute_from_sprite("", ""), None);
    }

    #[test]
    fn test_style_parsing() {
        assert_eq!(
            minute_from_sprite("background-position: -72px -216px;", ""),
            Some(63)
        );
        assert_eq!(
            minute_from_sprite("background-position: 0px -36px;", ""),
            Some(11)
        );
        assert_eq!(sprite_offsets("background-position: -36px -72px"), (Some(-36), Some(-72)));
    }

    #[test]
    fn test_out_of_range_offsets_are_undecodable() {
        // last tile is minute 120, stoppage on top of it is still fine
        assert_eq!(decode_minute(Some(-324), Some(-396), ""), Some(120));
        assert_eq!(decode_minute(Some(-324), Some(-396), "+3"), Some(123));
        assert_eq!(decode_minute(Some(0), Some(-432), ""), None);
        assert_eq!(decode_minute(Some(-360), Some(0), ""), None);
        assert_eq!(decode_minute(Some(i32::MIN), Some(i32::MIN), ""), None);
        assert_eq!(decode_minute(Some(-324), Some(-288), "+45"), None);
        assert_eq!(decode_minute(Some(-324), Some(-288), "-5"), None);
    }

    #[test]
    fn test_decode_is_pure() {
        for x in (-324..=0).step_by(12) {
            for y in (-360..=0).step_by(36) {
                let a = decode_minute(Some(x), Some(y), "1");
                let b = decode_minute(Some(x), Some(y), "1");
                assert_eq!(a, b);
                assert!(a.unwrap() >= 2);
            }
        }
    }
}
