//! Artifact naming convention.
//!
//! Rendered clips are named after the effect that produced them.

/// Generate the artifact filename for a rendered clip.
///
/// Convention: `motion_{effect_id}.mp4`.
///
/// # Examples
///
/// ```
/// use kenburns_core::naming::artifact_filename;
///
/// assert_eq!(artifact_filename("zoom_in_center"), "motion_zoom_in_center.mp4");
/// ```
pub fn artifact_filename(effect_id: &str) -> String {
    format!("motion_{effect_id}.mp4")
}

/// Add a numeric suffix before the extension so several clips with the
/// same effect can sit side by side: `motion_pan.mp4` -> `motion_pan_2.mp4`.
///
/// An index of 0 or 1 returns the name unchanged.
pub fn indexed_filename(filename: &str, index: u32) -> String {
    if index <= 1 {
        return filename.to_string();
    }
    match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}_{index}.{ext}"),
        _ => format!("{filename}_{index}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effect_in_name() {
        assert_eq!(artifact_filename("pan_left_to_right"), "motion_pan_left_to_right.mp4");
    }

    #[test]
    fn first_index_unchanged() {
        assert_eq!(indexed_filename("motion_a.mp4", 1), "motion_a.mp4");
        assert_eq!(indexed_filename("motion_a.mp4", 0), "motion_a.mp4");
    }

    #[test]
    fn suffix_before_extension() {
        assert_eq!(indexed_filename("motion_a.mp4", 3), "motion_a_3.mp4");
    }

    #[test]
    fn no_extension() {
        assert_eq!(indexed_filename("clip", 2), "clip_2");
        assert_eq!(indexed_filename(".hidden", 2), ".hidden_2");
    }
}
