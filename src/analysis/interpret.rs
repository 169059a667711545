use std::cmp::Ordering;

use serde::Serialize;

use crate::analysis::gate;
use crate::analysis::result::{AnalysisResult, ColorScore, LabelAnnotation, Rgb};

/// Returned when the histogram is empty or holds no usable score.
pub const FALLBACK_COLOR: &str = "#ffffff";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Interpretation {
    pub labels: Vec<String>,
    pub color: String,
    pub safe: bool,
}

pub fn interpret(result: &AnalysisResult) -> Interpretation {
    Interpretation {
        labels: ordered_labels(&result.labels),
        color: dominant_color(&result.colors),
        safe: gate::admits(&result.safe_search),
    }
}

/// Label descriptions by descending score. Equal scores keep detection order
/// and labels without a usable score go last.
pub fn ordered_labels(labels: &[LabelAnnotation]) -> Vec<String> {
    let mut ranked: Vec<&LabelAnnotation> = labels.iter().collect();
    // sort_by is stable
    ranked.sort_by(|a, b| by_score_desc(a.score, b.score));
    ranked.into_iter().map(|l| l.description.clone()).collect()
}

fn by_score_desc(a: f32, b: f32) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (false, false) => b.total_cmp(&a),
        (a_nan, b_nan) => a_nan.cmp(&b_nan),
    }
}

/// Hex form of the entry with the strictly greatest score; the first one
/// seen wins a tie.
pub fn dominant_color(colors: &[ColorScore]) -> String {
    let mut best: Option<&ColorScore> = None;
    for candidate in colors.iter().filter(|c| !c.score.is_nan()) {
        match best {
            Some(current) if candidate.score <= current.score => {}
            _ => best = Some(candidate),
        }
    }
    best.map(|c| hex_color(&c.color))
        .unwrap_or_else(|| FALLBACK_COLOR.to_string())
}

pub fn hex_color(rgb: &Rgb) -> String {
    format!("#{:02x}{:02x}{:02x}", channel(rgb.red), channel(rgb.green), channel(rgb.blue))
}

fn channel(value: f32) -> u8 {
    // `as` saturates and maps NaN to 0
    value.clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::result::{Likelihood, SafeSearch};

    fn label(description: &str, score: f32) -> LabelAnnotation {
        LabelAnnotation { description: description.to_string(), score }
    }

    fn color(red: f32, green: f32, blue: f32, score: f32) -> ColorScore {
        ColorScore { color: Rgb { red, green, blue }, score }
    }

    #[test]
    fn test_labels_descend_by_score() {
        let labels = vec![label("sky", 0.71), label("cat", 0.98), label("grass", 0.85)];
        assert_eq!(ordered_labels(&labels), vec!["cat", "grass", "sky"]);
    }

    #[test]
    fn test_equal_scores_keep_detection_order() {
        let labels = vec![
            label("b", 0.5),
            label("top", 0.9),
            label("a", 0.5),
            label("c", 0.5),
        ];
        assert_eq!(ordered_labels(&labels), vec!["top", "b", "a", "c"]);
    }

    #[test]
    fn test_nan_scores_sort_last() {
        let labels: Vec<_> = (0..64)
            .map(|i| {
                let score = if i % 3 == 0 { f32::NAN } else { i as f32 / 64.0 };
                label(&format!("l{i}"), score)
            })
            .collect();

        let ordered = ordered_labels(&labels);
        assert_eq!(ordered.len(), 64);
        assert_eq!(ordered[0], "l62");
        let first_nan = ordered.iter().position(|d| d == "l0").expect("nan label kept");
        assert_eq!(first_nan, 64 - 22);
        let nan_tail: Vec<_> = (0..64).step_by(3).map(|i| format!("l{i}")).collect();
        assert_eq!(ordered[first_nan..], nan_tail[..]);
    }

    #[test]
    fn test_ordering_does_not_touch_input() {
        let labels = vec![label("low", 0.1), label("high", 0.9)];
        let _ = ordered_labels(&labels);
        assert_eq!(labels[0].description, "low");
    }

    #[test]
    fn test_dominant_color_has_max_score() {
        let colors = vec![
            color(10.0, 20.0, 30.0, 0.2),
            color(255.0, 128.0, 0.0, 0.6),
            color(1.0, 2.0, 3.0, 0.2),
        ];
        assert_eq!(dominant_color(&colors), "#ff8000");
    }

    #[test]
    fn test_dominant_color_tie_keeps_first() {
        let colors = vec![color(1.0, 1.0, 1.0, 0.4), color(2.0, 2.0, 2.0, 0.4)];
        assert_eq!(dominant_color(&colors), "#010101");
    }

    #[test]
    fn test_empty_histogram_is_white() {
        assert_eq!(dominant_color(&[]), FALLBACK_COLOR);
        assert_eq!(dominant_color(&[color(0.0, 0.0, 0.0, f32::NAN)]), FALLBACK_COLOR);
    }

    #[test]
    fn test_hex_clamps_and_pads() {
        assert_eq!(hex_color(&Rgb { red: -4.0, green: 300.0, blue: 9.7 }), "#00ff09");
        assert_eq!(hex_color(&Rgb { red: 0.0, green: 0.0, blue: 0.0 }), "#000000");
    }

    #[test]
    fn test_interpret_combines_all_parts() {
        let result = AnalysisResult {
            labels: vec![label("dog", 0.6), label("ball", 0.9)],
            colors: vec![color(16.0, 32.0, 48.0, 1.0)],
            safe_search: SafeSearch { racy: Likelihood::VeryLikely, ..SafeSearch::default() },
        };
        let out = interpret(&result);
        assert_eq!(out.labels, vec!["ball", "dog"]);
        assert_eq!(out.color, "#102030");
        assert!(!out.safe);
    }
}
