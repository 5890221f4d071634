use image::{DynamicImage, GrayImage, ImageFormat};
use reqwest::blocking::{Client, multipart};
use serde::Deserialize;
use std::io::Cursor;
use std::time::Duration;

use super::OnlineRecognizer;
use crate::error::ServiceError;

/// Client for the OCR.space parse endpoint.
pub struct OcrSpaceClient {
    client: Client,
    api_key: String,
    endpoint: String,
    language: String,
}

impl OcrSpaceClient {
    pub fn new(api_key: &str, endpoint: &str, timeout: Duration) -> Result<Self, ServiceError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key: api_key.to_string(),
            endpoint: endpoint.to_string(),
            language: "auto".to_string(),
        })
    }
}

impl OnlineRecognizer for OcrSpaceClient {
    fn recognize(&self, bitmap: &GrayImage) -> Result<Option<String>, ServiceError> {
        if self.api_key.is_empty() {
            return Err(ServiceError::MissingApiKey);
        }

        let mut jpeg = Vec::new();
        DynamicImage::ImageLuma8(bitmap.clone())
            .write_to(&mut Cursor::new(&mut jpeg), ImageFormat::Jpeg)?;

        let file = multipart::Part::bytes(jpeg)
            .file_name("image.jpg")
            .mime_str("image/jpeg")?;
        let form = multipart::Form::new()
            .text("apikey", self.api_key.clone())
            .text("language", self.language.clone())
            .text("OCREngine", "2")
            .text("scale", "true")
            .part("file", file);

        let response = self.client.post(&self.endpoint).multipart(form).send()?;
        let status = response.status();
        let body = response.text()?;

        if !status.is_success() {
            return Err(ServiceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        parse_response(&body)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct OcrSpaceResponse {
    #[serde(default)]
    parsed_results: Option<Vec<ParsedResult>>,
    #[serde(default)]
    is_errored_on_processing: bool,
    #[serde(default)]
    error_message: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ParsedResult {
    #[serde(default)]
    parsed_text: Option<String>,
}

/// Extracts the first parsed text. Blank text is reported as `None`.
fn parse_response(body: &str) -> Result<Option<String>, ServiceError> {
    let response: OcrSpaceResponse = serde_json::from_str(body)
        .map_err(|e| ServiceError::Processing(format!("unexpected response: {}", e)))?;

    if response.is_errored_on_processing {
        let message = match response.error_message {
            serde_json::Value::String(s) => s,
            serde_json::Value::Array(items) => items
                .iter()
                .filter_map(|v| v.as_str())
                .collect::<Vec<_>>()
                .join("; "),
            other => other.to_string(),
        };
        return Err(ServiceError::Processing(message));
    }

    let text = response
        .parsed_results
        .unwrap_or_default()
        .into_iter()
        .next()
        .and_then(|r| r.parsed_text)
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());

    Ok(text)
}
