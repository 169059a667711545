use std::collections::HashMap;
use std::sync::Arc;

use image::imageops::FilterType;
use image::GenericImageView;

use crate::analysis::result::{AnalysisResult, ColorScore, Rgb, SafeSearch};
use crate::analysis::service::{AnalysisError, AnalysisService};
use crate::storage::{ObjectRef, ObjectStore};

const SAMPLE_EDGE: u32 = 64;
const MAX_COLORS: usize = 10;

/// Offline analyzer that derives the color histogram from the pixels.
///
/// It has no label or safety model: labels are empty and every category is
/// `UNKNOWN`, so the safety gate admits everything it analyzes.
pub struct PaletteAnalyzer {
    objects: Arc<dyn ObjectStore>,
}

impl PaletteAnalyzer {
    pub fn new(objects: Arc<dyn ObjectStore>) -> Self {
        Self { objects }
    }
}

impl AnalysisService for PaletteAnalyzer {
    fn annotate(&self, object: &ObjectRef) -> Result<AnalysisResult, AnalysisError> {
        let bytes = self.objects.get(&object.bucket, &object.name)?;
        let image = image::load_from_memory(&bytes)
            .map_err(|source| AnalysisError::Image { object: object.clone(), source })?;
        Ok(AnalysisResult {
            labels: Vec::new(),
            colors: histogram(&image),
            safe_search: SafeSearch::default(),
        })
    }
}

#[derive(Default)]
struct Bin {
    count: u64,
    sum: [u64; 3],
}

/// Quantize to 3 bits per channel; score is the share of opaque pixels in
/// the bin, color the bin's mean. Sorted by score, then by bin index.
pub fn histogram(image: &image::DynamicImage) -> Vec<ColorScore> {
    let sampled = image.resize_exact(SAMPLE_EDGE, SAMPLE_EDGE, FilterType::Nearest);
    let mut bins: HashMap<u16, Bin> = HashMap::new();
    let mut total = 0u64;

    for (_, _, pixel) in sampled.pixels() {
        if pixel[3] == 0 {
            continue;
        }
        let key = (u16::from(pixel[0] >> 5) << 6) | (u16::from(pixel[1] >> 5) << 3) | u16::from(pixel[2] >> 5);
        let bin = bins.entry(key).or_default();
        bin.count += 1;
        for channel in 0..3 {
            bin.sum[channel] += pixel[channel] as u64;
        }
        total += 1;
    }

    let mut ranked: Vec<(u16, Bin)> = bins.into_iter().collect();
    ranked.sort_by(|a, b| b.1.count.cmp(&a.1.count).then(a.0.cmp(&b.0)));

    ranked
        .into_iter()
        .take(MAX_COLORS)
        .map(|(_, bin)| {
            let mean = |c: usize| (bin.sum[c] / bin.count) as f32;
            ColorScore {
                color: Rgb { red: mean(0), green: mean(1), blue: mean(2) },
                score: bin.count as f32 / total as f32,
            }
        })
        .collect()
}
