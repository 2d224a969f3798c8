use crate::analysis::CareerAdvisor;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::models::{CareerPath, UserProfile};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const MAX_OUTPUT_TOKENS: u32 = 8192;

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    response_mime_type: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    system_instruction: Content,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    error: ErrorDetails,
}

#[derive(Debug, Deserialize)]
struct ErrorDetails {
    message: String,
    #[serde(default)]
    status: String,
}

/// Accepts either a bare array or `{"career_paths": [...]}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CareerPathsPayload {
    Bare(Vec<CareerPath>),
    Wrapped { career_paths: Vec<CareerPath> },
}

const SYSTEM_PROMPT: &str = r#"You are Career Compass, an experienced career counsellor.
You receive a person's professional profile and recommend concrete career paths.

For each career path provide:
- "career_path": the name of the role
- "suitability_reason": why it fits this specific person, citing their profile
- "required_skills": the skills the role needs, most important first
- "roadmap": ordered steps, each {"step": <1-based number>, "action": <short title>, "details": <what to do>}

Respond with ONLY valid JSON: an array of career path objects, no prose."#;

pub struct GeminiClient {
    client: Client,
    api_key: Option<String>,
    model: String,
    api_base: String,
}

impl GeminiClient {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| EngineError::config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key: config.gemini_api_key.clone(),
            model: config.model.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.api_base, self.model)
    }

    async fn generate(&self, prompt: String) -> Result<Vec<CareerPath>> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| EngineError::upstream("Gemini API key not set"))?;

        let request = GenerateContentRequest {
            system_instruction: Content {
                role: "system".to_string(),
                parts: vec![Part {
                    text: SYSTEM_PROMPT.to_string(),
                }],
            },
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.4,
                max_output_tokens: MAX_OUTPUT_TOKENS,
                response_mime_type: "application/json".to_string(),
            },
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            if let Ok(parsed) = serde_json::from_str::<GeminiError>(&body) {
                return Err(EngineError::upstream(format!(
                    "Gemini API error ({}): {} - {}",
                    status, parsed.error.status, parsed.error.message
                )));
            }
            return Err(EngineError::upstream(format!("Gemini API error ({}): {}", status, body)));
        }

        let completion: GenerateContentResponse = serde_json::from_str(&body)
            .map_err(|e| EngineError::upstream(format!("unexpected Gemini response: {}", e)))?;

        let text = completion
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .filter_map(|p| p.text)
            .collect::<Vec<_>>()
            .join("");

        if text.trim().is_empty() {
            return Err(EngineError::upstream("No text response from Gemini"));
        }

        parse_career_paths(&text)
    }
}

fn transport_error(err: reqwest::Error) -> EngineError {
    if err.is_timeout() {
        EngineError::timeout(err.to_string())
    } else if err.is_decode() {
        EngineError::upstream(err.to_string())
    } else {
        EngineError::network(err.to_string())
    }
}

/// Parse model output into career paths, tolerating a markdown code fence.
pub fn parse_career_paths(raw: &str) -> Result<Vec<CareerPath>> {
    let cleaned = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    match serde_json::from_str::<CareerPathsPayload>(cleaned) {
        Ok(CareerPathsPayload::Bare(paths)) | Ok(CareerPathsPayload::Wrapped { career_paths: paths }) => {
            Ok(paths)
        }
        Err(e) => {
            let preview: String = cleaned.chars().take(200).collect();
            Err(EngineError::upstream(format!(
                "malformed career paths ({}): {}",
                e, preview
            )))
        }
    }
}

fn profile_block(profile: &UserProfile) -> String {
    format!(
        "NAME: {}\nDEGREE / FIELD OF STUDY: {}\nQUALIFICATIONS & ACHIEVEMENTS: {}\nSKILLS: {}\n\nCV:\n{}",
        profile.name, profile.degree, profile.qualifications, profile.skills, profile.cv_text
    )
}

pub fn analysis_prompt(profile: &UserProfile) -> String {
    format!(
        "{}\n\nRecommend the top 3 career paths for this person, each with a step-by-step roadmap.",
        profile_block(profile)
    )
}

pub fn search_prompt(profile: &UserProfile, query: &str) -> String {
    format!(
        "{}\n\nThe person wants to pursue: \"{}\". Return exactly one career path for it, explaining how \
         their background fits and giving a personalized step-by-step roadmap.",
        profile_block(profile),
        query
    )
}

#[async_trait]
impl CareerAdvisor for GeminiClient {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn analyze(&self, profile: &UserProfile) -> Result<Vec<CareerPath>> {
        self.generate(analysis_prompt(profile)).await
    }

    async fn search(&self, profile: &UserProfile, query: &str) -> Result<Vec<CareerPath>> {
        self.generate(search_prompt(profile, query)).await
    }
}
