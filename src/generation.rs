//! Answer generation over a local Ollama endpoint.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Turns a fully rendered prompt into an answer string.
pub trait GenerationService: Send + Sync {
    fn complete(&self, prompt: &str) -> Result<String>;
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Blocking client for Ollama's `/api/generate` endpoint.
pub struct OllamaClient {
    client: reqwest::blocking::Client,
    base_url: String,
    model: String,
    temperature: f32,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str, temperature: f32) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| Error::Generation(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            temperature,
        })
    }
}

impl GenerationService for OllamaClient {
    fn complete(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);
        debug!(model = %self.model, prompt_len = prompt.len(), "requesting completion");

        let response = self
            .client
            .post(&url)
            .json(&GenerateRequest {
                model: &self.model,
                prompt,
                stream: false,
                options: GenerateOptions {
                    temperature: self.temperature,
                },
            })
            .send()
            .map_err(|e| Error::Generation(e.to_string()))?
            .error_for_status()
            .map_err(|e| Error::Generation(e.to_string()))?;

        let body: GenerateResponse = response
            .json()
            .map_err(|e| Error::Generation(e.to_string()))?;

        Ok(body.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_normalized() {
        let client =
            OllamaClient::new("http://localhost:11434/", "llama3.2", 0.2).unwrap();
        assert_eq!(client.base_url, "http://localhost:11434");
    }

    #[test]
    fn request_body_shape_matches_the_ollama_api() {
        let request = GenerateRequest {
            model: "llama3.2",
            prompt: "hello",
            stream: false,
            options: GenerateOptions { temperature: 0.2 },
        };
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["model"], "llama3.2");
        assert_eq!(json["stream"], false);
        assert!((json["options"]["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);
    }
}
