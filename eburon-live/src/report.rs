//! Post-interview evaluation report.
//!
//! After the conversation ends, the transcript goes to a text model for a
//! structured evaluation. Report generation is best-effort by contract: the
//! caller always gets a report, and any failure along the way (network,
//! quota, malformed model output) degrades to a neutral one with the
//! transcript attached so a human can still review the interview.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::error::{LiveError, Result};
use crate::session::persona::ApplicantProfile;
use crate::transcript::{TranscriptItem, TranscriptRole};

/// Text model used for transcript analysis.
pub const REPORT_MODEL: &str = "gemini-2.5-flash";

const GENERATE_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

const FALLBACK_SUMMARY: &str = "Automated analysis failed due to technical error.";
const THIN_SUMMARY: &str = "Analysis failed or insufficient data.";

/// Final hiring recommendation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Recommendation {
    Hire,
    #[default]
    Consider,
    Pass,
}

/// Structured evaluation of one interview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewReport {
    pub applicant_id: String,
    pub summary: String,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    /// Overall fit, 0 to 100.
    pub score: u8,
    pub recommendation: Recommendation,
    pub transcript: Vec<TranscriptItem>,
}

impl InterviewReport {
    fn from_analysis(
        applicant: &ApplicantProfile,
        analysis: Analysis,
        transcript: Vec<TranscriptItem>,
    ) -> Self {
        let recommendation = match analysis.recommendation.as_deref() {
            Some("HIRE") => Recommendation::Hire,
            Some("PASS") => Recommendation::Pass,
            Some("CONSIDER") | None => Recommendation::Consider,
            Some(other) => {
                warn!(value = other, "unexpected recommendation, using CONSIDER");
                Recommendation::Consider
            }
        };
        Self {
            applicant_id: applicant.id.clone(),
            summary: analysis
                .summary
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| THIN_SUMMARY.to_string()),
            strengths: analysis.strengths.unwrap_or_default(),
            weaknesses: analysis.weaknesses.unwrap_or_default(),
            score: analysis.score.unwrap_or(0.0).round().clamp(0.0, 100.0) as u8,
            recommendation,
            transcript,
        }
    }

    fn fallback(applicant: &ApplicantProfile, transcript: Vec<TranscriptItem>) -> Self {
        Self {
            applicant_id: applicant.id.clone(),
            summary: FALLBACK_SUMMARY.to_string(),
            strengths: Vec::new(),
            weaknesses: Vec::new(),
            score: 0,
            recommendation: Recommendation::Consider,
            transcript,
        }
    }
}

/// Fields the analysis model is asked to return. Every field is optional so
/// a partially filled answer still yields a usable report.
#[derive(Debug, Default, Deserialize)]
struct Analysis {
    summary: Option<String>,
    strengths: Option<Vec<String>>,
    weaknesses: Option<Vec<String>>,
    score: Option<f64>,
    recommendation: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Default, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: CandidateContent,
}

#[derive(Debug, Default, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Default, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

/// Turns transcripts into [`InterviewReport`]s via the generate-content API.
pub struct ReportGenerator {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl ReportGenerator {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            model: REPORT_MODEL.to_string(),
            base_url: GENERATE_BASE_URL.to_string(),
        }
    }

    /// Point at a different API host (proxies, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Evaluate one finished interview. Never fails: errors are logged and
    /// produce the neutral fallback report.
    pub async fn generate(
        &self,
        applicant: &ApplicantProfile,
        transcript: &[TranscriptItem],
    ) -> InterviewReport {
        match self.request_analysis(applicant, transcript).await {
            Ok(analysis) => {
                InterviewReport::from_analysis(applicant, analysis, transcript.to_vec())
            }
            Err(e) => {
                warn!("report generation failed: {e}");
                InterviewReport::fallback(applicant, transcript.to_vec())
            }
        }
    }

    async fn request_analysis(
        &self,
        applicant: &ApplicantProfile,
        transcript: &[TranscriptItem],
    ) -> Result<Analysis> {
        let url = format!(
            "{}/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );
        let body = json!({
            "contents": [{ "parts": [{ "text": build_prompt(applicant, transcript) }] }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": {
                    "type": "OBJECT",
                    "properties": {
                        "summary": {
                            "type": "STRING",
                            "description": "Executive summary of the interview performance"
                        },
                        "strengths": {
                            "type": "ARRAY",
                            "items": { "type": "STRING" },
                            "description": "List of key strengths demonstrated"
                        },
                        "weaknesses": {
                            "type": "ARRAY",
                            "items": { "type": "STRING" },
                            "description": "List of areas for improvement or red flags"
                        },
                        "score": {
                            "type": "NUMBER",
                            "description": "Overall fit score from 0 to 100"
                        },
                        "recommendation": {
                            "type": "STRING",
                            "enum": ["HIRE", "CONSIDER", "PASS"],
                            "description": "Final hiring recommendation"
                        }
                    },
                    "required": ["summary", "strengths", "weaknesses", "score", "recommendation"]
                }
            }
        });

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LiveError::Report(format!("request failed: {e}")))?
            .error_for_status()
            .map_err(|e| LiveError::Report(format!("api rejected request: {e}")))?;

        let payload: GenerateResponse = response
            .json()
            .await
            .map_err(|e| LiveError::Report(format!("unreadable response: {e}")))?;
        let text = payload
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.as_str())
            .unwrap_or_default();
        if text.is_empty() {
            return Ok(Analysis::default());
        }
        serde_json::from_str(text)
            .map_err(|e| LiveError::Report(format!("malformed analysis json: {e}")))
    }
}

fn build_prompt(applicant: &ApplicantProfile, transcript: &[TranscriptItem]) -> String {
    format!(
        "You are an expert HR Analyst. Analyze the following job interview transcript \
         between an HR Manager (Beatrice) and an Applicant ({name}).\n\n\
         APPLICANT ROLE: {role}\n\
         EXPERIENCE: {experience}\n\n\
         TRANSCRIPT:\n{transcript}\n\n\
         Based on the interview, generate a structured evaluation report.",
        name = applicant.name,
        role = applicant.role,
        experience = applicant.experience,
        transcript = transcript_text(transcript),
    )
}

fn transcript_text(transcript: &[TranscriptItem]) -> String {
    if transcript.is_empty() {
        return "No audible conversation recorded.".to_string();
    }
    transcript
        .iter()
        .map(|item| {
            let role = match item.role {
                TranscriptRole::User => "USER",
                TranscriptRole::Model => "MODEL",
            };
            format!("{role}: {}", item.text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
