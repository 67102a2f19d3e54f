//! Venue time normalization.
//!
//! Km-reduction times are only comparable across tracks after adding a
//! per-venue offset relative to VINCENNES (the national reference, 0.0).
//! A negative offset means the surface is faster than the reference.

use super::EngineError;

/// (venue, seconds to add to a raw time to normalize it to the reference)
const TRACK_COEFFICIENTS: &[(&str, f64)] = &[
    // Paris region
    ("VINCENNES", 0.0),
    ("ENGHIEN", 0.0),
    ("SAINT-CLOUD", 0.2),
    // Normandy
    ("CABOURG", -0.5),
    ("CAEN", 0.8),
    ("ARGENTAN", 0.4),
    ("GRAIGNES", 0.6),
    ("LISIEUX", 0.3),
    // Brittany / Loire
    ("NANTES", 0.5),
    ("RENNES", 0.4),
    ("CORDEMAIS", 0.7),
    ("PLOERMEL", 0.5),
    // Riviera
    ("CAGNES-SUR-MER", 0.3),
    ("HYERES", 0.4),
    ("MARSEILLE-BORELY", 0.5),
    ("FREJUS", 0.4),
    // South-west
    ("BORDEAUX", 0.5),
    ("PAU", 0.6),
    ("TOULOUSE", 0.4),
    ("AGEN", 0.5),
    ("TARBES", 0.6),
    // Centre
    ("VICHY", 0.3),
    ("AMIENS", 0.5),
    ("CHARTRES", 0.4),
    ("ANGERS", 0.5),
    ("LE MANS", 0.4),
    ("LAVAL", 0.5),
    // East
    ("REIMS", 0.4),
    ("STRASBOURG", 0.3),
    ("METZ", 0.4),
    ("NANCY", 0.5),
    ("COLMAR", 0.4),
    // North / Rhône
    ("LYON-PARILLY", 0.3),
    ("LYON", 0.3),
    ("ROUEN", 0.5),
    ("LILLE", 0.4),
    ("CHATEAUBRIANT", 0.6),
    // Others
    ("MESLAY-DU-MAINE", 0.5),
    ("CRAON", 0.6),
    ("SEGRE", 0.5),
    ("PORNICHET", 0.4),
    ("LA CAPELLE", 0.7),
];

/// Alternative spellings seen in provider feeds.
const TRACK_ALIASES: &[(&str, &str)] = &[
    ("PARIS-VINCENNES", "VINCENNES"),
    ("CAGNES", "CAGNES-SUR-MER"),
    ("LYON PARILLY", "LYON-PARILLY"),
    ("MARSEILLE", "MARSEILLE-BORELY"),
    ("BORELY", "MARSEILLE-BORELY"),
];

/// Surface speed category, for the report document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackCategory {
    Fast,
    Reference,
    Normal,
    Slow,
}

fn canonical(venue: &str) -> String {
    let upper = venue.trim().to_uppercase();
    for (alias, target) in TRACK_ALIASES {
        if *alias == upper {
            return (*target).to_string();
        }
    }
    upper
}

/// Look up the normalization offset for a venue.
///
/// Unknown venues are an error; the caller decides whether to proceed
/// with an unnormalized time; there is no silent 0.0 default.
pub fn coefficient(venue: &str) -> Result<f64, EngineError> {
    let name = canonical(venue);
    TRACK_COEFFICIENTS
        .iter()
        .find(|(v, _)| *v == name)
        .map(|(_, c)| *c)
        .ok_or_else(|| EngineError::UnknownVenue(venue.to_string()))
}

pub fn category(offset: f64) -> TrackCategory {
    if offset < -0.3 {
        TrackCategory::Fast
    } else if offset == 0.0 {
        TrackCategory::Reference
    } else if offset > 0.5 {
        TrackCategory::Slow
    } else {
        TrackCategory::Normal
    }
}
