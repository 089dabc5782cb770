//! Conversion parameter defaults and lenient parsing.
//!
//! Duration and stage arrive as free text (env vars, form fields). Anything
//! unparsable falls back to the defaults instead of rejecting the upload.

/// Clip length used when none is given or the value is unusable.
pub const DEFAULT_DURATION_SECS: f64 = 5.0;

/// Longest clip the Conversion Service will render.
pub const MAX_DURATION_SECS: f64 = 60.0;

pub const DEFAULT_STAGE: u8 = 1;

pub const MIN_STAGE: u8 = 1;

pub const MAX_STAGE: u8 = 3;

/// Parse a clip duration in seconds.
///
/// Non-numeric, non-finite, zero or negative input yields
/// [`DEFAULT_DURATION_SECS`]; values above [`MAX_DURATION_SECS`] are clamped.
pub fn parse_duration(raw: Option<&str>) -> f64 {
    raw.and_then(|s| s.trim().parse::<f64>().ok())
        .map(normalize_duration)
        .unwrap_or(DEFAULT_DURATION_SECS)
}

/// Apply the default/clamp rules of [`parse_duration`] to a number.
pub fn normalize_duration(seconds: f64) -> f64 {
    if !seconds.is_finite() || seconds <= 0.0 {
        return DEFAULT_DURATION_SECS;
    }
    seconds.min(MAX_DURATION_SECS)
}

/// Parse an effect stage. Anything outside `1..=3` yields [`DEFAULT_STAGE`].
pub fn parse_stage(raw: Option<&str>) -> u8 {
    raw.and_then(|s| s.trim().parse::<u8>().ok())
        .map(normalize_stage)
        .unwrap_or(DEFAULT_STAGE)
}

pub fn normalize_stage(stage: u8) -> u8 {
    if (MIN_STAGE..=MAX_STAGE).contains(&stage) {
        stage
    } else {
        DEFAULT_STAGE
    }
}

/// Convert a 0-1 progress fraction into a whole percentage (0-100).
pub fn progress_percent(fraction: f64) -> u8 {
    if !fraction.is_finite() {
        return 0;
    }
    (fraction.clamp(0.0, 1.0) * 100.0).round() as u8
}
