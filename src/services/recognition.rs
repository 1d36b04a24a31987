use std::io::Cursor;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use leptess::{LepTess, Variable};
use reqwest::Client;
use serde_json::Value;

use crate::core::config::Settings;
use crate::services::preprocess;

/// The cloud provider reports no usable numeric confidence, so a constant
/// stand-in is used for its results.
const CLOUD_CONFIDENCE: f64 = 0.9;
/// A tier's result is accepted outright only above this confidence.
const ACCEPT_THRESHOLD: f64 = 0.7;

const TESSERACT_PSM_SINGLE_BLOCK: &str = "6";

#[derive(Debug, Clone)]
pub(crate) struct Recognition {
    pub(crate) text: String,
    pub(crate) confidence: f64,
}

#[async_trait]
pub(crate) trait TextRecognizer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns `Ok(None)` when the provider ran but found no usable text.
    async fn recognize(&self, image: &[u8]) -> Result<Option<Recognition>>;
}

/// Ordered recognizer tiers. The first tier whose confidence crosses the
/// acceptance threshold wins; otherwise the last attempted tier's outcome is
/// returned as-is, even at confidence zero. Provider failures are logged and
/// absorbed here, never raised to the caller.
pub(crate) struct TextExtractionEngine {
    recognizers: Vec<Box<dyn TextRecognizer>>,
}

impl TextExtractionEngine {
    pub(crate) fn from_settings(settings: &Settings) -> Result<Self> {
        let mut recognizers: Vec<Box<dyn TextRecognizer>> = Vec::new();

        if let Some(vision) = GoogleVisionRecognizer::from_settings(settings)? {
            recognizers.push(Box::new(vision));
        }
        recognizers.push(Box::new(TesseractRecognizer::from_settings(settings)));

        Ok(Self::new(recognizers))
    }

    pub(crate) fn new(recognizers: Vec<Box<dyn TextRecognizer>>) -> Self {
        Self { recognizers }
    }

    pub(crate) async fn extract(&self, image: &[u8]) -> (Option<String>, f64) {
        let mut last: (Option<String>, f64) = (None, 0.0);

        for recognizer in &self.recognizers {
            match recognizer.recognize(image).await {
                Ok(Some(recognition)) => {
                    if recognition.confidence > ACCEPT_THRESHOLD {
                        tracing::debug!(
                            provider = recognizer.name(),
                            confidence = recognition.confidence,
                            "Accepted recognition result"
                        );
                        return (Some(recognition.text), recognition.confidence);
                    }
                    last = (Some(recognition.text), recognition.confidence);
                }
                Ok(None) => {
                    last = (None, 0.0);
                }
                Err(err) => {
                    tracing::warn!(
                        provider = recognizer.name(),
                        error = %err,
                        "Recognition provider failed; trying next tier"
                    );
                    last = (None, 0.0);
                }
            }
        }

        last
    }
}

/// Cloud tier: Google Vision `images:annotate` with `TEXT_DETECTION`. The
/// first annotation covers the whole image; raw (non-preprocessed) bytes are
/// sent because the provider runs its own normalization.
pub(crate) struct GoogleVisionRecognizer {
    client: Client,
    api_key: String,
    endpoint: String,
}

impl GoogleVisionRecognizer {
    pub(crate) fn from_settings(settings: &Settings) -> Result<Option<Self>> {
        if !settings.vision().is_configured() {
            return Ok(None);
        }

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(20))
            .timeout(Duration::from_secs(settings.vision().timeout_seconds))
            .build()
            .context("Failed to build text-detection HTTP client")?;

        Ok(Some(Self {
            client,
            api_key: settings.vision().api_key.clone(),
            endpoint: settings.vision().endpoint.clone(),
        }))
    }
}

#[async_trait]
impl TextRecognizer for GoogleVisionRecognizer {
    fn name(&self) -> &'static str {
        "google_vision"
    }

    async fn recognize(&self, image: &[u8]) -> Result<Option<Recognition>> {
        let payload = serde_json::json!({
            "requests": [{
                "image": {"content": STANDARD.encode(image)},
                "features": [{"type": "TEXT_DETECTION"}]
            }]
        });

        let url = format!("{}?key={}", self.endpoint, self.api_key);
        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .context("Failed to call text-detection API")?;

        let status = response.status();
        let body: Value =
            response.json().await.context("Failed to read text-detection response")?;

        if !status.is_success() {
            anyhow::bail!(
                "text detection request failed (status {}): {}",
                status,
                extract_error_message(&body)
            );
        }

        let first = body.get("responses").and_then(Value::as_array).and_then(|list| list.first());
        if let Some(error) = first.and_then(|item| item.get("error")) {
            anyhow::bail!("text detection returned an error: {}", extract_error_message(error));
        }

        match first.and_then(extract_annotation_text) {
            Some(text) => Ok(Some(Recognition { text, confidence: CLOUD_CONFIDENCE })),
            None => Ok(None),
        }
    }
}

fn extract_annotation_text(response: &Value) -> Option<String> {
    let text = response
        .get("textAnnotations")
        .and_then(Value::as_array)
        .and_then(|annotations| annotations.first())
        .and_then(|annotation| annotation.get("description"))
        .and_then(Value::as_str)?
        .trim();

    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

fn extract_error_message(value: &Value) -> String {
    value
        .get("error")
        .and_then(|error| error.get("message"))
        .or_else(|| value.get("message"))
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string()
}

/// Local tier: preprocessed image fed to Tesseract (combined Uzbek+English
/// models, single-block page segmentation). Confidence is the mean of the
/// non-negative per-token confidences, scaled to [0, 1].
pub(crate) struct TesseractRecognizer {
    languages: String,
    data_path: Option<String>,
}

impl TesseractRecognizer {
    pub(crate) fn from_settings(settings: &Settings) -> Self {
        Self {
            languages: settings.tesseract().languages.clone(),
            data_path: settings.tesseract().data_path.clone(),
        }
    }
}

#[async_trait]
impl TextRecognizer for TesseractRecognizer {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    async fn recognize(&self, image: &[u8]) -> Result<Option<Recognition>> {
        let image = image.to_vec();
        let languages = self.languages.clone();
        let data_path = self.data_path.clone();

        tokio::task::spawn_blocking(move || {
            recognize_blocking(&image, &languages, data_path.as_deref())
        })
        .await
        .context("Recognition task aborted")?
    }
}

fn recognize_blocking(
    image: &[u8],
    languages: &str,
    data_path: Option<&str>,
) -> Result<Option<Recognition>> {
    let Some(processed) = preprocess::preprocess_image(image) else {
        return Ok(None);
    };

    let mut png = Vec::new();
    image::DynamicImage::ImageLuma8(processed)
        .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .context("Failed to encode preprocessed image")?;

    let mut engine =
        LepTess::new(data_path, languages).context("Failed to initialize Tesseract")?;
    engine
        .set_variable(Variable::TesseditPagesegMode, TESSERACT_PSM_SINGLE_BLOCK)
        .context("Failed to configure page segmentation")?;
    engine.set_image_from_mem(&png).context("Failed to set image for recognition")?;

    let text = engine.get_utf8_text().context("Text recognition failed")?;
    let text = text.trim().to_string();
    if text.is_empty() {
        return Ok(None);
    }

    let confidence =
        engine.get_tsv_text(0).map(|tsv| mean_token_confidence(&tsv)).unwrap_or(0.0);

    Ok(Some(Recognition { text, confidence }))
}

/// Tesseract TSV rows carry a confidence column (index 10): 0-100 for word
/// rows, negative for structural rows. Negative entries are excluded; with no
/// tokens left the confidence is 0.
fn mean_token_confidence(tsv: &str) -> f64 {
    let mut sum = 0.0;
    let mut tokens = 0u32;

    for line in tsv.lines() {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 12 {
            continue;
        }
        if let Ok(confidence) = fields[10].parse::<f64>() {
            if confidence >= 0.0 {
                sum += confidence;
                tokens += 1;
            }
        }
    }

    if tokens == 0 {
        0.0
    } else {
        (sum / f64::from(tokens)) / 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct StaticRecognizer {
        label: &'static str,
        result: Option<Recognition>,
        calls: Arc<AtomicUsize>,
    }

    impl StaticRecognizer {
        fn boxed(
            label: &'static str,
            result: Option<Recognition>,
        ) -> (Box<dyn TextRecognizer>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (Box::new(Self { label, result, calls: calls.clone() }), calls)
        }
    }

    #[async_trait]
    impl TextRecognizer for StaticRecognizer {
        fn name(&self) -> &'static str {
            self.label
        }

        async fn recognize(&self, _image: &[u8]) -> Result<Option<Recognition>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.result.clone())
        }
    }

    struct FailingRecognizer;

    #[async_trait]
    impl TextRecognizer for FailingRecognizer {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn recognize(&self, _image: &[u8]) -> Result<Option<Recognition>> {
            anyhow::bail!("provider exploded")
        }
    }

    #[tokio::test]
    async fn high_confidence_tier_skips_fallback() {
        let (cloud, _) = StaticRecognizer::boxed(
            "cloud",
            Some(Recognition { text: "cloud text".to_string(), confidence: 0.9 }),
        );
        let (local, local_calls) = StaticRecognizer::boxed(
            "local",
            Some(Recognition { text: "local text".to_string(), confidence: 0.5 }),
        );

        let engine = TextExtractionEngine::new(vec![cloud, local]);
        let (text, confidence) = engine.extract(b"image").await;

        assert_eq!(text.as_deref(), Some("cloud text"));
        assert_eq!(confidence, 0.9);
        assert_eq!(local_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn provider_error_falls_back_to_next_tier() {
        let (local, local_calls) = StaticRecognizer::boxed(
            "local",
            Some(Recognition { text: "local text".to_string(), confidence: 0.4 }),
        );

        let engine = TextExtractionEngine::new(vec![Box::new(FailingRecognizer), local]);
        let (text, confidence) = engine.extract(b"image").await;

        assert_eq!(text.as_deref(), Some("local text"));
        assert_eq!(confidence, 0.4);
        assert_eq!(local_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn last_tier_outcome_is_returned_even_when_empty() {
        let (low, _) = StaticRecognizer::boxed(
            "low",
            Some(Recognition { text: "weak".to_string(), confidence: 0.5 }),
        );
        let (empty, _) = StaticRecognizer::boxed("empty", None);

        let engine = TextExtractionEngine::new(vec![low, empty]);
        let (text, confidence) = engine.extract(b"image").await;

        assert!(text.is_none());
        assert_eq!(confidence, 0.0);
    }

    #[tokio::test]
    async fn all_tiers_failing_returns_nothing() {
        let engine = TextExtractionEngine::new(vec![Box::new(FailingRecognizer)]);
        let (text, confidence) = engine.extract(b"image").await;

        assert!(text.is_none());
        assert_eq!(confidence, 0.0);
    }

    #[test]
    fn annotation_text_takes_first_entry() {
        let response = serde_json::json!({
            "textAnnotations": [
                {"description": "  Ism: Aliyev Vali\n1. A  "},
                {"description": "Ism:"}
            ]
        });

        assert_eq!(
            extract_annotation_text(&response).as_deref(),
            Some("Ism: Aliyev Vali\n1. A")
        );
    }

    #[test]
    fn annotation_text_handles_empty_responses() {
        assert!(extract_annotation_text(&serde_json::json!({})).is_none());
        assert!(extract_annotation_text(&serde_json::json!({"textAnnotations": []})).is_none());
        assert!(extract_annotation_text(
            &serde_json::json!({"textAnnotations": [{"description": "   "}]})
        )
        .is_none());
    }

    #[test]
    fn token_confidence_excludes_negative_rows() {
        let tsv = "1\t1\t0\t0\t0\t0\t0\t0\t100\t100\t-1\t\n\
                   5\t1\t1\t1\t1\t1\t0\t0\t50\t20\t80\tIsm:\n\
                   5\t1\t1\t1\t1\t2\t60\t0\t50\t20\t90\tAliyev\n";
        let confidence = mean_token_confidence(tsv);
        assert!((confidence - 0.85).abs() < 1e-9);
    }

    #[test]
    fn token_confidence_defaults_to_zero() {
        assert_eq!(mean_token_confidence(""), 0.0);
        assert_eq!(mean_token_confidence("1\t1\t0\t0\t0\t0\t0\t0\t9\t9\t-1\t\n"), 0.0);
    }
}
