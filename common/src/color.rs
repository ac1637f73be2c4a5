use crate::{
    error::CommandError,
    palette::{ColorId, Palette, Rgb},
};

// Squared luminance weights (0.30², 0.59², 0.11²) scaled by 10 000 so the
// distance stays exact in integers.
const WEIGHT_R: u32 = 900;
const WEIGHT_G: u32 = 3_481;
const WEIGHT_B: u32 = 121;

pub fn weighted_distance(a: Rgb, b: Rgb) -> u32 {
    let dr = u32::from(a.r.abs_diff(b.r));
    let dg = u32::from(a.g.abs_diff(b.g));
    let db = u32::from(a.b.abs_diff(b.b));
    WEIGHT_R * dr * dr + WEIGHT_G * dg * dg + WEIGHT_B * db * db
}

/// Palette entry closest to `target`.
///
/// An exact match returns immediately, so among identical colors the earliest
/// entry wins. Otherwise ties also go to the earliest entry.
pub fn closest_entry(palette: &Palette, target: Rgb) -> ColorId {
    let mut best = palette.first();
    let mut best_distance = u32::MAX;

    for (id, entry) in palette.iter() {
        let distance = weighted_distance(target, entry.rgb);
        if distance == 0 {
            return id;
        }
        if distance < best_distance {
            best_distance = distance;
            best = id;
        }
    }

    best
}

/// Parses `(r,g,b)`. Any single non-digit character separates fields, and the
/// leading `(` is optional. Exactly three components in `0..=255` are required.
pub fn parse_rgb(input: &str) -> Result<Rgb, CommandError> {
    let trimmed = input.trim();
    let body = trimmed.strip_prefix('(').unwrap_or(trimmed);
    let malformed = |reason| CommandError::MalformedColor {
        input: input.to_string(),
        reason,
    };

    let mut fields = [0_u8; 3];
    let mut count = 0;
    let mut digits_from = None;
    let mut trailing_separator = false;

    for (offset, ch) in body.char_indices() {
        if trailing_separator {
            return Err(malformed("unexpected characters after third component"));
        }

        if ch.is_ascii_digit() {
            digits_from.get_or_insert(offset);
            continue;
        }

        let Some(from) = digits_from.take() else {
            return Err(malformed("empty component"));
        };
        fields[count] = component(&body[from..offset])?;
        count += 1;
        trailing_separator = count == fields.len();
    }

    if let Some(from) = digits_from {
        fields[count] = component(&body[from..])?;
        count += 1;
    }

    if count < fields.len() {
        return Err(malformed("fewer than three components"));
    }

    Ok(Rgb::new(fields[0], fields[1], fields[2]))
}

fn component(digits: &str) -> Result<u8, CommandError> {
    digits
        .parse()
        .map_err(|_| CommandError::ColorComponentOutOfRange {
            component: digits.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::palette::PaletteEntry;

    fn naive_closest(palette: &Palette, target: Rgb) -> u32 {
        palette
            .iter()
            .map(|(_, entry)| weighted_distance(target, entry.rgb))
            .min()
            .unwrap()
    }

    #[test]
    fn exact_palette_colors_match_themselves() {
        let palette = Palette::default();
        for (id, entry) in palette.iter() {
            assert_eq!(closest_entry(&palette, entry.rgb), id, "{}", entry.name);
        }
    }

    #[test]
    fn dark_red_request_matches_red_entry() {
        let palette = Palette::default();
        let rgb = parse_rgb("(139,0,0)").unwrap();
        let id = closest_entry(&palette, rgb);
        assert_eq!(palette.get(id).name, "red");
        assert_eq!(weighted_distance(rgb, palette.get(id).rgb), 0);
    }

    #[test]
    fn duplicate_colors_resolve_to_earliest_entry() {
        let palette = Palette::new(vec![
            PaletteEntry::new("first", 1, Rgb::new(10, 20, 30)),
            PaletteEntry::new("second", 2, Rgb::new(10, 20, 30)),
        ])
        .unwrap();

        let id = closest_entry(&palette, Rgb::new(10, 20, 30));
        assert_eq!(palette.get(id).name, "first");
        let id = closest_entry(&palette, Rgb::new(12, 20, 30));
        assert_eq!(palette.get(id).name, "first");
    }

    #[test]
    fn near_black_selects_cycle_placeholder() {
        let palette = Palette::default();
        let id = closest_entry(&palette, Rgb::new(5, 5, 5));
        assert_eq!(palette.get(id).name, "cycle");
    }

    #[test]
    fn green_dominates_the_weighting() {
        // Equal raw offsets on one channel; green should cost the most.
        let base = Rgb::new(100, 100, 100);
        let red = weighted_distance(base, Rgb::new(110, 100, 100));
        let green = weighted_distance(base, Rgb::new(100, 110, 100));
        let blue = weighted_distance(base, Rgb::new(100, 100, 110));
        assert!(green > red && red > blue);
    }

    #[test]
    fn closest_is_a_global_minimum() {
        let palette = Palette::default();
        for r in (0..=255).step_by(17) {
            for g in (0..=255).step_by(51) {
                for b in (0..=255).step_by(85) {
                    let target = Rgb::new(r as u8, g as u8, b as u8);
                    let chosen = closest_entry(&palette, target);
                    let distance = weighted_distance(target, palette.get(chosen).rgb);
                    assert_eq!(distance, naive_closest(&palette, target));
                }
            }
        }
    }

    #[test]
    fn parses_with_any_single_separator() {
        assert_eq!(parse_rgb("(255,0,128)").unwrap(), Rgb::new(255, 0, 128));
        assert_eq!(parse_rgb("(1;2 3)").unwrap(), Rgb::new(1, 2, 3));
        assert_eq!(parse_rgb("4,5,6").unwrap(), Rgb::new(4, 5, 6));
        assert_eq!(parse_rgb(" (7.8.9) ").unwrap(), Rgb::new(7, 8, 9));
    }

    #[test]
    fn rejects_malformed_colors() {
        for input in ["", "()", "(1,2)", "(1,,2,3)", "(1,2,3,4)", "(a,2,3)", "(1,2,3))"] {
            assert!(
                matches!(parse_rgb(input), Err(CommandError::MalformedColor { .. })),
                "{input}"
            );
        }
    }

    #[test]
    fn rejects_out_of_range_component() {
        assert_eq!(
            parse_rgb("(256,0,0)"),
            Err(CommandError::ColorComponentOutOfRange {
                component: "256".to_string()
            })
        );
        assert_eq!(
            parse_rgb("(0,99999999999,0)"),
            Err(CommandError::ColorComponentOutOfRange {
                component: "99999999999".to_string()
            })
        );
        assert_eq!(parse_rgb("(000255,0,7)").unwrap(), Rgb::new(255, 0, 7));
    }
}
