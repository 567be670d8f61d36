//! Deterministic profile colors.
//!
//! Avatars without an uploaded image get a color derived from a string, so
//! every client renders the same person in the same hue without storing an
//! asset. Light and dark presentation share the hue and differ only in
//! saturation and lightness.

use crate::error::SharedError;
use crate::models::Identity;
use crate::types::ThemeMode;

/// (saturation, lightness) in percent for light mode.
const LIGHT_SL: (u8, u8) = (50, 60);
/// (saturation, lightness) in percent for dark mode.
const DARK_SL: (u8, u8) = (70, 30);

/// An HSL color descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hsl {
    pub hue: u16,
    pub saturation: u8,
    pub lightness: u8,
}

impl Hsl {
    /// Parse the `hsl(H, S%, L%)` form produced by [`Hsl`]'s `Display`.
    pub fn parse(s: &str) -> Result<Self, SharedError> {
        let invalid = || SharedError::InvalidColor(s.to_string());
        let inner = s
            .trim()
            .strip_prefix("hsl(")
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(invalid)?;

        let mut parts = inner.split(',').map(str::trim);
        let hue = parts
            .next()
            .and_then(|p| p.parse::<u16>().ok())
            .filter(|h| *h < 360)
            .ok_or_else(invalid)?;
        let saturation = parts
            .next()
            .and_then(|p| p.strip_suffix('%'))
            .and_then(|p| p.parse::<u8>().ok())
            .ok_or_else(invalid)?;
        let lightness = parts
            .next()
            .and_then(|p| p.strip_suffix('%'))
            .and_then(|p| p.parse::<u8>().ok())
            .ok_or_else(invalid)?;
        if parts.next().is_some() {
            return Err(invalid());
        }

        Ok(Self {
            hue,
            saturation,
            lightness,
        })
    }
}

impl std::fmt::Display for Hsl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "hsl({}, {}%, {}%)",
            self.hue, self.saturation, self.lightness
        )
    }
}

/// 32-bit rolling string hash over UTF-16 code units:
/// `hash = (hash << 5) - hash + unit`, wrapping on overflow.
pub fn string_hash(input: &str) -> i32 {
    input.encode_utf16().fold(0i32, |hash, unit| {
        hash.wrapping_shl(5)
            .wrapping_sub(hash)
            .wrapping_add(i32::from(unit))
    })
}

/// Hue in `[0, 360)` for `input`.
pub fn hue_of(input: &str) -> u16 {
    string_hash(input).rem_euclid(360) as u16
}

pub fn hsl_of(input: &str, dark: bool) -> Hsl {
    let (saturation, lightness) = if dark { DARK_SL } else { LIGHT_SL };
    Hsl {
        hue: hue_of(input),
        saturation,
        lightness,
    }
}

/// Color token for `input`, e.g. `hsl(212, 50%, 60%)`.
pub fn color_of(input: &str, dark: bool) -> String {
    hsl_of(input, dark).to_string()
}

/// Stored profile color if the identity has one, otherwise a color derived
/// from the display name, then the email, then the id.
pub fn profile_color(identity: &Identity, mode: ThemeMode) -> String {
    if let Some(color) = identity.profile_color.as_deref().filter(|c| !c.is_empty()) {
        return color.to_string();
    }
    derived_profile_color(identity, mode)
}

pub fn derived_profile_color(identity: &Identity, mode: ThemeMode) -> String {
    let seed = [
        identity.full_name.as_str(),
        identity.email.as_str(),
        identity.id.as_str(),
    ]
    .into_iter()
    .find(|s| !s.is_empty())
    .unwrap_or_default();
    color_of(seed, mode.is_dark())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UserId;

    #[test]
    fn color_is_deterministic() {
        assert_eq!(color_of("Alice", false), color_of("Alice", false));
    }

    #[test]
    fn light_and_dark_share_hue() {
        let light = Hsl::parse(&color_of("Alice", false)).unwrap();
        let dark = Hsl::parse(&color_of("Alice", true)).unwrap();
        assert_eq!(light.hue, dark.hue);
        assert_ne!(
            (light.saturation, light.lightness),
            (dark.saturation, dark.lightness)
        );
        assert_eq!((light.saturation, light.lightness), (50, 60));
        assert_eq!((dark.saturation, dark.lightness), (70, 30));
    }

    #[test]
    fn hash_matches_reference_values() {
        // "a" = 97; "ab" = 97 * 31 + 98
        assert_eq!(string_hash(""), 0);
        assert_eq!(string_hash("a"), 97);
        assert_eq!(string_hash("ab"), 3105);
        assert_eq!(hue_of("ab"), (3105 % 360) as u16);
    }

    #[test]
    fn long_input_wraps_and_hue_stays_in_range() {
        let long = "The quick brown fox jumps over the lazy dog".repeat(8);
        let hash = string_hash(&long);
        let hue = hue_of(&long);
        assert!(hue < 360);
        assert_eq!(i64::from(hue), i64::from(hash).rem_euclid(360));
    }

    #[test]
    fn negative_hash_normalizes() {
        // Find any input whose hash is negative and check the hue is positive.
        let input = (0..200)
            .map(|i| format!("user-{i}-with-a-longer-name"))
            .find(|s| string_hash(s) < 0)
            .expect("some input hashes negative");
        assert!(hue_of(&input) < 360);
    }

    #[test]
    fn profile_color_preference_order() {
        let mut identity = Identity {
            id: UserId::new("uid-1"),
            email: "bea@example.com".into(),
            ..Default::default()
        };
        assert_eq!(
            profile_color(&identity, ThemeMode::Light),
            color_of("bea@example.com", false)
        );

        identity.full_name = "Bea".into();
        assert_eq!(
            profile_color(&identity, ThemeMode::Dark),
            color_of("Bea", true)
        );

        identity.profile_color = Some("hsl(1, 2%, 3%)".into());
        assert_eq!(profile_color(&identity, ThemeMode::Dark), "hsl(1, 2%, 3%)");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(Hsl::parse("rgb(1,2,3)").is_err());
        assert!(Hsl::parse("hsl(400, 50%, 60%)").is_err());
        assert!(Hsl::parse("hsl(10, 50, 60%)").is_err());
    }
}
