//! Inference request construction
//!
//! Wraps the caller's prompt in the human/assistant turn markers the
//! text-completion protocol expects and bundles it with generation
//! parameters. A built request is immutable and serializes to the same
//! bytes every time, so the exact payload sent to the primary is reused
//! for the fallback hop.

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Marker opening the human turn
pub const HUMAN_TURN: &str = "\n\nHuman: ";
/// Marker opening the assistant turn (the model completes after it)
pub const ASSISTANT_TURN: &str = "\n\nAssistant:";

/// Outbound completion payload
///
/// Serializes directly into the wire body:
/// `{"prompt", "max_tokens_to_sample", "temperature", "stop_sequences"}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InferenceRequest {
    prompt: String,
    #[serde(rename = "max_tokens_to_sample")]
    max_output_tokens: u32,
    temperature: f64,
    stop_sequences: Vec<String>,
}

impl InferenceRequest {
    /// Build a request from a raw prompt and generation parameters
    ///
    /// The prompt is embedded verbatim; leading and trailing whitespace is
    /// preserved.
    ///
    /// # Errors
    /// Returns `AppError::EmptyPrompt` if `prompt` is empty.
    pub fn build(
        prompt: &str,
        max_output_tokens: u32,
        temperature: f64,
        stop_sequences: Vec<String>,
    ) -> AppResult<Self> {
        if prompt.is_empty() {
            return Err(AppError::EmptyPrompt);
        }

        Ok(Self {
            prompt: format!("{HUMAN_TURN}{prompt}{ASSISTANT_TURN}"),
            max_output_tokens,
            temperature,
            stop_sequences,
        })
    }

    /// Build a request using parameters loaded from configuration
    pub fn from_params(prompt: &str, params: &GenerationParams) -> AppResult<Self> {
        Self::build(
            prompt,
            params.max_tokens(),
            params.temperature(),
            params.stop_sequences().to_vec(),
        )
    }

    /// Prompt text including turn markers, exactly as sent on the wire
    pub fn prompt_text(&self) -> &str {
        &self.prompt
    }

    pub fn max_output_tokens(&self) -> u32 {
        self.max_output_tokens
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn stop_sequences(&self) -> &[String] {
        &self.stop_sequences
    }
}

/// Generation parameters as configured under `[generation]`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GenerationParams {
    #[serde(default = "default_max_tokens")]
    max_tokens: u32,
    #[serde(default = "default_temperature")]
    temperature: f64,
    #[serde(default = "default_stop_sequences")]
    stop_sequences: Vec<String>,
}

fn default_max_tokens() -> u32 {
    300
}

fn default_temperature() -> f64 {
    0.5
}

fn default_stop_sequences() -> Vec<String> {
    vec![HUMAN_TURN.trim_end().to_string()]
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            stop_sequences: default_stop_sequences(),
        }
    }
}

impl GenerationParams {
    /// Create validated generation parameters
    ///
    /// # Errors
    /// Returns `AppError::Config` if `max_tokens` is zero or `temperature`
    /// is not a finite number in `[0.0, 1.0]`.
    pub fn new(max_tokens: u32, temperature: f64, stop_sequences: Vec<String>) -> AppResult<Self> {
        let params = Self {
            max_tokens,
            temperature,
            stop_sequences,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn stop_sequences(&self) -> &[String] {
        &self.stop_sequences
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.max_tokens == 0 {
            return Err(AppError::Config(
                "generation.max_tokens must be greater than 0".to_string(),
            ));
        }

        if !self.temperature.is_finite() || !(0.0..=1.0).contains(&self.temperature) {
            return Err(AppError::Config(format!(
                "generation.temperature must be a finite number between 0.0 and 1.0, got {}",
                self.temperature
            )));
        }

        if self.stop_sequences.iter().any(|s| s.is_empty()) {
            return Err(AppError::Config(
                "generation.stop_sequences must not contain empty strings".to_string(),
            ));
        }

        Ok(())
    }
}
