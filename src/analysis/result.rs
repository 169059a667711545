use serde::{Deserialize, Serialize};

/// Ordinal likelihood scale shared by every safety category.
///
/// Variants are declared in ascending order so the derived `Ord` matches the
/// scale: `Unknown < VeryUnlikely < ... < VeryLikely`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Likelihood {
    #[default]
    Unknown,
    VeryUnlikely,
    Unlikely,
    Possible,
    Likely,
    VeryLikely,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Adult,
    Medical,
    Racy,
    Spoof,
    Violence,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Adult,
        Category::Medical,
        Category::Racy,
        Category::Spoof,
        Category::Violence,
    ];
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafeSearch {
    pub adult: Likelihood,
    pub medical: Likelihood,
    pub racy: Likelihood,
    pub spoof: Likelihood,
    pub violence: Likelihood,
}

impl SafeSearch {
    pub fn get(&self, category: Category) -> Likelihood {
        match category {
            Category::Adult => self.adult,
            Category::Medical => self.medical,
            Category::Racy => self.racy,
            Category::Spoof => self.spoof,
            Category::Violence => self.violence,
        }
    }

    /// Every category set to the same likelihood.
    pub fn uniform(likelihood: Likelihood) -> Self {
        Self {
            adult: likelihood,
            medical: likelihood,
            racy: likelihood,
            spoof: likelihood,
            violence: likelihood,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelAnnotation {
    pub description: String,
    pub score: f32,
}

/// Channel values as reported by the analysis service, nominally 0-255.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rgb {
    pub red: f32,
    pub green: f32,
    pub blue: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorScore {
    pub color: Rgb,
    pub score: f32,
}

/// Everything the pipeline needs from one analysis call, independent of any
/// vendor's response schema. Labels and colors keep detection order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisResult {
    pub labels: Vec<LabelAnnotation>,
    pub colors: Vec<ColorScore>,
    pub safe_search: SafeSearch,
}
