//! JSON shape of a vision `AnnotateImageResponse`.
//!
//! Only the three features the pipeline requests are modelled. Everything is
//! converted into [`AnalysisResult`] at this boundary so interpretation never
//! sees the vendor schema.

use serde::Deserialize;

use crate::analysis::result::{AnalysisResult, ColorScore, LabelAnnotation, Rgb, SafeSearch};

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnnotateImageResponse {
    pub label_annotations: Vec<EntityAnnotation>,
    pub image_properties_annotation: Option<ImageProperties>,
    pub safe_search_annotation: Option<SafeSearch>,
    pub error: Option<Status>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EntityAnnotation {
    pub description: String,
    pub score: f32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ImageProperties {
    pub dominant_colors: Option<DominantColors>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DominantColors {
    pub colors: Vec<ColorInfo>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ColorInfo {
    pub color: Rgb,
    pub score: f32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Status {
    pub code: i32,
    pub message: String,
}

impl AnnotateImageResponse {
    /// Split off the embedded error status, if the service reported one.
    pub fn into_result(self) -> Result<AnalysisResult, Status> {
        if let Some(status) = self.error {
            return Err(status);
        }

        let labels = self
            .label_annotations
            .into_iter()
            .map(|a| LabelAnnotation { description: a.description, score: a.score })
            .collect();

        let colors = self
            .image_properties_annotation
            .and_then(|p| p.dominant_colors)
            .map(|d| d.colors)
            .unwrap_or_default()
            .into_iter()
            .map(|c| ColorScore { color: c.color, score: c.score })
            .collect();

        Ok(AnalysisResult {
            labels,
            colors,
            // A missing annotation leaves every category UNKNOWN.
            safe_search: self.safe_search_annotation.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::result::Likelihood;

    const SAMPLE: &str = r#"{
        "labelAnnotations": [
            {"mid": "/m/01yrx", "description": "Cat", "score": 0.97, "topicality": 0.97},
            {"mid": "/m/0jbk", "description": "Animal", "score": 0.88}
        ],
        "imagePropertiesAnnotation": {
            "dominantColors": {"colors": [
                {"color": {"red": 200, "green": 180}, "score": 0.3, "pixelFraction": 0.1}
            ]}
        },
        "safeSearchAnnotation": {
            "adult": "VERY_UNLIKELY", "spoof": "UNLIKELY", "medical": "UNLIKELY",
            "violence": "POSSIBLE", "racy": "VERY_UNLIKELY"
        }
    }"#;

    #[test]
    fn test_vendor_response_converts() -> anyhow::Result<()> {
        let response: AnnotateImageResponse = serde_json::from_str(SAMPLE)?;
        let result = response.into_result().map_err(|s| anyhow::anyhow!(s.message))?;

        assert_eq!(result.labels.len(), 2);
        assert_eq!(result.labels[0].description, "Cat");
        assert_eq!(result.colors[0].color, Rgb { red: 200.0, green: 180.0, blue: 0.0 });
        assert_eq!(result.safe_search.violence, Likelihood::Possible);
        Ok(())
    }

    #[test]
    fn test_error_status_is_surfaced() -> anyhow::Result<()> {
        let response: AnnotateImageResponse =
            serde_json::from_str(r#"{"error": {"code": 7, "message": "denied"}}"#)?;
        let status = response.into_result().err().ok_or_else(|| anyhow::anyhow!("expected error"))?;
        assert_eq!(status.code, 7);
        Ok(())
    }

    #[test]
    fn test_empty_response_is_blank_result() -> anyhow::Result<()> {
        let response: AnnotateImageResponse = serde_json::from_str("{}")?;
        let result = response.into_result().map_err(|s| anyhow::anyhow!(s.message))?;
        assert!(result.labels.is_empty());
        assert!(result.colors.is_empty());
        Ok(())
    }
}
