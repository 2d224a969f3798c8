//! Profile and career-path data model

use crate::error::{EngineError, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============ User Profile ============

/// One subject's input to analysis.
///
/// Field names on the wire match the profile format persisted by earlier
/// versions of the app (`cvText`, `dp`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: String,
    pub degree: String,
    pub qualifications: String,
    pub skills: String,
    #[serde(rename = "cvText")]
    pub cv_text: String,
    /// Profile picture as a `data:` URI
    #[serde(default)]
    pub dp: Option<String>,
}

/// The editable text fields of a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileField {
    Name,
    Degree,
    Qualifications,
    Skills,
    CvText,
}

impl ProfileField {
    pub const REQUIRED: [ProfileField; 5] = [
        ProfileField::Name,
        ProfileField::Degree,
        ProfileField::Qualifications,
        ProfileField::Skills,
        ProfileField::CvText,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileField::Name => "name",
            ProfileField::Degree => "degree",
            ProfileField::Qualifications => "qualifications",
            ProfileField::Skills => "skills",
            ProfileField::CvText => "cv_text",
        }
    }
}

impl UserProfile {
    pub fn field(&self, field: ProfileField) -> &str {
        match field {
            ProfileField::Name => &self.name,
            ProfileField::Degree => &self.degree,
            ProfileField::Qualifications => &self.qualifications,
            ProfileField::Skills => &self.skills,
            ProfileField::CvText => &self.cv_text,
        }
    }

    pub fn set_field(&mut self, field: ProfileField, value: impl Into<String>) {
        let value = value.into();
        match field {
            ProfileField::Name => self.name = value,
            ProfileField::Degree => self.degree = value,
            ProfileField::Qualifications => self.qualifications = value,
            ProfileField::Skills => self.skills = value,
            ProfileField::CvText => self.cv_text = value,
        }
    }

    /// Required fields that are empty or whitespace-only.
    pub fn missing_fields(&self) -> Vec<ProfileField> {
        ProfileField::REQUIRED
            .iter()
            .copied()
            .filter(|f| self.field(*f).trim().is_empty())
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// Gate applied before anything is handed to the analysis service.
    pub fn ensure_complete(&self) -> Result<()> {
        let missing = self.missing_fields();
        if missing.is_empty() {
            return Ok(());
        }
        let names: Vec<&str> = missing.iter().map(|f| f.as_str()).collect();
        Err(EngineError::validation(format!(
            "profile incomplete, missing: {}",
            names.join(", ")
        )))
    }

    /// First word of the name for greetings, "User" when there is none.
    pub fn first_name(&self) -> &str {
        self.name.split_whitespace().next().unwrap_or("User")
    }

    /// Store raw image bytes as a `data:<mime>;base64,...` URI.
    pub fn set_picture(&mut self, mime: &str, bytes: &[u8]) -> Result<()> {
        if !mime.starts_with("image/") {
            return Err(EngineError::validation(format!(
                "profile picture must be an image, got {}",
                mime
            )));
        }
        self.dp = Some(format!("data:{};base64,{}", mime, BASE64.encode(bytes)));
        Ok(())
    }

    /// Decode the profile picture back into (mime, bytes).
    pub fn picture(&self) -> Result<Option<(String, Vec<u8>)>> {
        let Some(uri) = self.dp.as_deref() else {
            return Ok(None);
        };
        let (mime, bytes) = decode_data_uri(uri)?;
        Ok(Some((mime, bytes)))
    }
}

fn decode_data_uri(uri: &str) -> Result<(String, Vec<u8>)> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| EngineError::validation("picture is not a data URI"))?;
    let (mime, payload) = rest
        .split_once(";base64,")
        .ok_or_else(|| EngineError::validation("picture data URI is not base64 encoded"))?;
    let bytes = BASE64
        .decode(payload)
        .map_err(|e| EngineError::validation(format!("picture payload is invalid: {}", e)))?;
    Ok((mime.to_string(), bytes))
}

// ============ Profile Version ============

/// Monotonic token minted every time the stored profile is replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProfileVersion(u64);

impl ProfileVersion {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ProfileVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

// ============ Career Paths ============

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoadmapStep {
    #[serde(default = "unnumbered_step", deserialize_with = "lenient_step")]
    pub step: u32,
    pub action: String,
    #[serde(default)]
    pub details: String,
}

/// Position given to steps without a usable number: after every numbered one.
fn unnumbered_step() -> u32 {
    u32::MAX
}

/// Step numbers as models actually write them: `2`, `2.0` or `"2"`.
fn lenient_step<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawStep {
        Int(u64),
        Float(f64),
        Text(String),
    }

    let from_float = |f: f64| {
        if f.is_finite() {
            // `as` saturates: negatives become 0, huge values u32::MAX
            f.round() as u32
        } else {
            unnumbered_step()
        }
    };

    Ok(match RawStep::deserialize(deserializer)? {
        RawStep::Int(n) => u32::try_from(n).unwrap_or(u32::MAX),
        RawStep::Float(f) => from_float(f),
        RawStep::Text(text) => text
            .trim()
            .parse::<f64>()
            .map(from_float)
            .unwrap_or_else(|_| unnumbered_step()),
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CareerPath {
    pub career_path: String,
    pub suitability_reason: String,
    #[serde(default)]
    pub required_skills: Vec<String>,
    #[serde(default)]
    pub roadmap: Vec<RoadmapStep>,
}

impl CareerPath {
    /// Roadmap in ascending step order. Stable, so duplicate step numbers keep
    /// the order the service returned them in.
    pub fn ordered_roadmap(&self) -> Vec<&RoadmapStep> {
        let mut steps: Vec<&RoadmapStep> = self.roadmap.iter().collect();
        steps.sort_by_key(|s| s.step);
        steps
    }
}

/// A persisted successful analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: String,
    pub created_at: String,
    pub paths: Vec<CareerPath>,
}

impl AnalysisRecord {
    pub fn new(paths: Vec<CareerPath>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            paths,
        }
    }
}
