//! # Packed Base Allele Bytes
//!
//! One byte per genomic locus, holding four 2-bit confidence fields ordered
//! A,C,G,T from high to low bits. Field values encode relative read support:
//! 0 = no coverage, 1 = very low confidence, 2 = moderate (valid only when
//! proportionally dominant), 3 = dirac (dominant/exclusive).

use crate::error::{HapError, Result};

/// No coverage for a base
pub const CONF_NONE: u8 = 0;
/// Very low confidence presence
pub const CONF_LOW: u8 = 1;
/// Moderate presence, valid only when proportionally dominant
pub const CONF_MODERATE: u8 = 2;
/// Dominant/exclusive presence
pub const CONF_DIRAC: u8 = 3;

/// The four allele bases in PBA field order (high bits to low bits)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Base {
    A = 0,
    C = 1,
    G = 2,
    T = 3,
}

/// All bases in field order, for slot iteration
pub const BASES: [Base; 4] = [Base::A, Base::C, Base::G, Base::T];

impl Base {
    /// Base from a field index (0=A .. 3=T)
    pub fn from_index(idx: usize) -> Result<Self> {
        match idx {
            0 => Ok(Base::A),
            1 => Ok(Base::C),
            2 => Ok(Base::G),
            3 => Ok(Base::T),
            _ => Err(HapError::invalid_data(format!(
                "allele field index {} out of range",
                idx
            ))),
        }
    }

    /// Field index (0=A .. 3=T)
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Bit shift of this base's 2-bit field within a PBA byte
    #[inline]
    fn shift(self) -> u32 {
        6 - 2 * self as u32
    }

    /// Single-character representation for reports
    pub fn symbol(self) -> char {
        match self {
            Base::A => 'A',
            Base::C => 'C',
            Base::G => 'G',
            Base::T => 'T',
        }
    }
}

/// Confidence level of `base` within a PBA byte
#[inline]
pub fn confidence(pba: u8, base: Base) -> u8 {
    (pba >> base.shift()) & 0b11
}

/// Build a PBA byte from per-base confidence levels
#[inline]
pub fn pack(a: u8, c: u8, g: u8, t: u8) -> u8 {
    debug_assert!(a <= 3 && c <= 3 && g <= 3 && t <= 3);
    (a << 6) | (c << 4) | (g << 2) | t
}

/// A PBA byte with a single dirac field for `base` and nothing else
#[inline]
pub fn dirac(base: Base) -> u8 {
    CONF_DIRAC << base.shift()
}

/// Diploid slot cost of one confidence level: a dirac claims both
/// chromosomes, any lesser presence claims one.
#[inline]
fn slot_cost(conf: u8) -> u8 {
    match conf {
        CONF_NONE => 0,
        CONF_DIRAC => 2,
        _ => 1,
    }
}

/// Whether a PBA byte conforms to the diploid encoding rules: at most one
/// dirac field standing alone, or at most two lesser fields whose combined
/// slot cost does not exceed the two diploid slots.
pub fn is_conformant(pba: u8) -> bool {
    let mut slots = 0u8;
    for base in BASES {
        slots += slot_cost(confidence(pba, base));
    }
    slots <= 2
}

/// Normalise a PBA byte.
///
/// A lone moderate-confidence field is promoted to a dirac (low-coverage
/// dominant allele), conformant bytes pass through unchanged, and
/// non-conformant bytes are zeroed. Normalisation is idempotent: applying it
/// to an already-normalised byte is a no-op.
pub fn normalise(pba: u8) -> u8 {
    if pba == 0 {
        return 0;
    }
    if !is_conformant(pba) {
        return 0;
    }
    // Promote a lone moderate field to dirac.
    let mut nonzero = 0usize;
    let mut lone = Base::A;
    for base in BASES {
        if confidence(pba, base) != CONF_NONE {
            nonzero += 1;
            lone = base;
        }
    }
    if nonzero == 1 && confidence(pba, lone) == CONF_MODERATE {
        return dirac(lone);
    }
    pba
}

/// The single allele a founder carries at a locus, if unambiguous.
///
/// A founder is credited with an allele only when exactly one field is set
/// and that field is a dirac. Founders with two or more fields set are
/// ambiguous and carry no allele for stack purposes.
pub fn single_dirac(pba: u8) -> Option<Base> {
    let mut found = None;
    for base in BASES {
        match confidence(pba, base) {
            CONF_NONE => {}
            CONF_DIRAC => {
                if found.is_some() {
                    return None;
                }
                found = Some(base);
            }
            // Any lesser field alongside disqualifies the byte.
            _ => return None,
        }
    }
    found
}

/// Iterate the bases present in a byte (confidence >= 1) with their levels
pub fn present_alleles(pba: u8) -> impl Iterator<Item = (Base, u8)> {
    BASES
        .into_iter()
        .filter_map(move |base| match confidence(pba, base) {
            CONF_NONE => None,
            conf => Some((base, conf)),
        })
}

/// Whether a byte records any read coverage at all
#[inline]
pub fn has_coverage(pba: u8) -> bool {
    pba != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_layout() {
        // A occupies the high bits, T the low bits
        assert_eq!(dirac(Base::A), 0b1100_0000);
        assert_eq!(dirac(Base::C), 0b0011_0000);
        assert_eq!(dirac(Base::G), 0b0000_1100);
        assert_eq!(dirac(Base::T), 0b0000_0011);

        let byte = pack(1, 2, 3, 0);
        assert_eq!(confidence(byte, Base::A), 1);
        assert_eq!(confidence(byte, Base::C), 2);
        assert_eq!(confidence(byte, Base::G), 3);
        assert_eq!(confidence(byte, Base::T), 0);
    }

    #[test]
    fn test_conformance() {
        assert!(is_conformant(0));
        assert!(is_conformant(dirac(Base::A)));
        assert!(is_conformant(pack(1, 1, 0, 0)));
        assert!(is_conformant(pack(2, 2, 0, 0)));
        assert!(is_conformant(pack(2, 1, 0, 0)));
        assert!(is_conformant(pack(0, 0, 0, 2)));

        // A dirac can never share the byte with another field
        assert!(!is_conformant(pack(3, 1, 0, 0)));
        assert!(!is_conformant(pack(3, 3, 0, 0)));
        // Three fields exceed the diploid slots
        assert!(!is_conformant(pack(1, 1, 1, 0)));
    }

    #[test]
    fn test_normalise_promotes_lone_moderate() {
        // 0x02: lone moderate T promoted to dirac T (0x03)
        assert_eq!(normalise(0x02), 0x03);
        assert_eq!(normalise(pack(2, 0, 0, 0)), dirac(Base::A));
    }

    #[test]
    fn test_normalise_zeroes_non_conformant() {
        assert_eq!(normalise(pack(3, 1, 0, 0)), 0);
        assert_eq!(normalise(pack(3, 3, 0, 0)), 0);
        assert_eq!(normalise(pack(2, 2, 1, 0)), 0);
        assert_eq!(normalise(pack(1, 1, 1, 1)), 0);
    }

    #[test]
    fn test_normalise_idempotent() {
        for byte in 0..=255u8 {
            let once = normalise(byte);
            assert_eq!(normalise(once), once, "byte {:#04x}", byte);
        }
    }

    #[test]
    fn test_single_dirac() {
        assert_eq!(single_dirac(dirac(Base::G)), Some(Base::G));
        assert_eq!(single_dirac(0), None);
        // Two low-confidence fields: ambiguous, no allele
        assert_eq!(single_dirac(pack(1, 1, 0, 0)), None);
        // Moderate field is not a dirac
        assert_eq!(single_dirac(pack(0, 2, 0, 0)), None);
    }

    #[test]
    fn test_present_alleles() {
        let byte = pack(0, 2, 0, 2);
        let present: Vec<_> = present_alleles(byte).collect();
        assert_eq!(present, vec![(Base::C, 2), (Base::T, 2)]);
        assert_eq!(present_alleles(0).count(), 0);
    }
}
