//! Receipt field extraction via a vision-capable model.
//!
//! The receipt image is base64-encoded into an OpenAI chat-completions request whose prompt asks
//! for a fixed set of JSON fields. Models sometimes wrap JSON in code fences despite instructions,
//! so fences are stripped before parsing, and missing fields are defaulted with a warning so that
//! one stubborn receipt does not lose the whole record.

use crate::model::Amount;
use crate::{Config, Mode, Result};
use anyhow::Context;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{Local, NaiveDate};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use std::str::FromStr;
use tracing::{debug, warn};

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

const MAX_TOKENS: u32 = 500;

/// The default for text fields the model failed to produce.
const UNSPECIFIED: &str = "Unspecified";

/// The categories the model is asked to choose from.
pub(crate) const CATEGORIES: &[&str] = &[
    "Subscriptions",
    "Health",
    "Housing",
    "Transport",
    "Education",
    "Groceries",
    "Dining",
    "Extraordinary",
];

/// The structured fields extracted from one receipt image.
#[derive(Debug, Clone, Eq, PartialEq)]
pub(crate) struct ReceiptFields {
    pub(crate) date: NaiveDate,
    pub(crate) description: String,
    pub(crate) amount: Amount,
    pub(crate) merchant: String,
    pub(crate) category: String,
    pub(crate) payment_method: String,
}

impl ReceiptFields {
    /// Parses a model reply into receipt fields.
    ///
    /// Code fences are stripped if present. A reply that is not JSON at all is an error; a JSON
    /// reply with missing fields gets defaults (today's date, a zero amount, "Unspecified") with
    /// a warning for each.
    pub(crate) fn from_reply(reply: &str) -> Result<Self> {
        let cleaned = strip_code_fences(reply);
        let raw: RawFields = serde_json::from_str(cleaned)
            .with_context(|| format!("The model reply was not valid JSON: {cleaned}"))?;

        let date = match raw.date.as_deref().and_then(parse_reply_date) {
            Some(date) => date,
            None => {
                warn!("The model reply had no usable date, defaulting to today");
                Local::now().date_naive()
            }
        };

        let amount = match raw.amount.as_ref().and_then(parse_reply_amount) {
            Some(amount) => amount,
            None => {
                warn!("The model reply had no usable amount, defaulting to zero");
                Amount::default()
            }
        };

        Ok(Self {
            date,
            description: text_field(raw.description, "description"),
            amount,
            merchant: text_field(raw.merchant, "merchant"),
            category: text_field(raw.category, "category"),
            payment_method: text_field(raw.payment_method, "payment_method"),
        })
    }
}

/// The model reply as it arrives, before defaulting.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RawFields {
    date: Option<String>,
    description: Option<String>,
    /// Sometimes a JSON number, sometimes a formatted string.
    amount: Option<Value>,
    merchant: Option<String>,
    category: Option<String>,
    payment_method: Option<String>,
}

/// Something that can turn a receipt image into structured fields.
#[async_trait::async_trait]
pub(crate) trait Extractor {
    async fn extract(&self, image: &[u8]) -> Result<ReceiptFields>;
}

/// Creates an `Extractor` implementation for the given mode.
pub(crate) fn extractor(config: &Config, mode: Mode) -> Result<Box<dyn Extractor + Send + Sync>> {
    match mode {
        Mode::Google => Ok(Box::new(OpenAiVision::new(
            config.openai_api_key()?,
            config.model(),
        ))),
        Mode::Test => Ok(Box::new(TestVision::default())),
    }
}

/// Calls the OpenAI chat-completions endpoint with the receipt image attached.
pub(crate) struct OpenAiVision {
    client: reqwest::Client,
    api_key: String,
    model: String,
    url: String,
}

impl OpenAiVision {
    pub(crate) fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            url: OPENAI_CHAT_URL.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl Extractor for OpenAiVision {
    async fn extract(&self, image: &[u8]) -> Result<ReceiptFields> {
        let encoded = BASE64.encode(image);
        let payload = json!({
            "model": self.model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": extraction_prompt() },
                    { "type": "image_url", "image_url": {
                        "url": format!("data:image/jpeg;base64,{encoded}")
                    }}
                ]
            }],
            "max_tokens": MAX_TOKENS
        });

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .context("Failed to send the receipt extraction request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read response body".to_string());
            anyhow::bail!("Vision API request failed with status {status}: {body}");
        }

        let body: Value = response
            .json()
            .await
            .context("Failed to parse the vision API response")?;
        let content = body
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .context("The vision API response had no message content")?;
        debug!("Extracted receipt data: {content}");

        ReceiptFields::from_reply(content)
    }
}

/// The prompt sent alongside each receipt image.
fn extraction_prompt() -> String {
    let categories = CATEGORIES
        .iter()
        .map(|c| format!("   - {c}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Analyze this image of a receipt or invoice and extract the following information in \
JSON format:
1. date: the transaction date (YYYY-MM-DD format)
2. description: a short description of the purchase or service
3. merchant: the name of the business that issued the receipt
4. amount: the total amount paid (decimal number)
5. payment_method: how the purchase was paid, e.g. Card or Cash, or \"Unknown\" if not shown
6. category: assign one of these categories to the expense:
{categories}

Respond ONLY with the raw JSON object, without code fences (```), quotes, or additional text."
    )
}

/// Strips Markdown code fences that models sometimes wrap around JSON replies.
fn strip_code_fences(reply: &str) -> &str {
    let mut cleaned = reply.trim();
    if let Some(rest) = cleaned.strip_prefix("```json") {
        cleaned = rest;
    } else if let Some(rest) = cleaned.strip_prefix("```") {
        cleaned = rest;
    }
    if let Some(rest) = cleaned.strip_suffix("```") {
        cleaned = rest;
    }
    cleaned.trim()
}

fn parse_reply_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

fn parse_reply_amount(value: &Value) -> Option<Amount> {
    match value {
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok().map(Amount::new),
        Value::String(s) => Amount::from_str(s).ok(),
        _ => None,
    }
}

fn text_field(value: Option<String>, name: &str) -> String {
    match value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()) {
        Some(s) => s,
        None => {
            warn!("The model reply had no '{name}' field, defaulting to '{UNSPECIFIED}'");
            UNSPECIFIED.to_string()
        }
    }
}

/// An `Extractor` that pops canned replies, for running the pipeline without the vision API.
#[derive(Debug)]
pub(crate) struct TestVision {
    fields: std::sync::Mutex<std::collections::VecDeque<ReceiptFields>>,
}

impl TestVision {
    pub(crate) fn new(canned: Vec<ReceiptFields>) -> Self {
        Self {
            fields: std::sync::Mutex::new(canned.into()),
        }
    }
}

impl Default for TestVision {
    fn default() -> Self {
        let fields = |date: &str, merchant: &str, amount: &str, category: &str| ReceiptFields {
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap_or_default(),
            description: format!("{merchant} purchase"),
            amount: Amount::from_str(amount).unwrap_or_default(),
            merchant: merchant.to_string(),
            category: category.to_string(),
            payment_method: "Card".to_string(),
        };
        Self::new(vec![
            fields("2026-03-01", "Mercadona", "€42.10", "Groceries"),
            fields("2026-03-03", "Cafetería Sol", "€6.80", "Dining"),
        ])
    }
}

#[async_trait::async_trait]
impl Extractor for TestVision {
    async fn extract(&self, _image: &[u8]) -> Result<ReceiptFields> {
        let mut queue = self
            .fields
            .lock()
            .map_err(|_| anyhow::anyhow!("TestVision lock poisoned"))?;
        queue
            .pop_front()
            .context("TestVision has run out of canned replies")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_reply_plain_json() {
        let reply = r#"{
            "date": "2026-02-14",
            "description": "Dinner for two",
            "amount": 48.0,
            "merchant": "La Trattoria",
            "category": "Dining",
            "payment_method": "Card"
        }"#;
        let fields = ReceiptFields::from_reply(reply).unwrap();
        assert_eq!(fields.date, NaiveDate::from_ymd_opt(2026, 2, 14).unwrap());
        assert_eq!(fields.merchant, "La Trattoria");
        assert_eq!(fields.amount.value(), Decimal::from_str("48").unwrap());
        assert_eq!(fields.payment_method, "Card");
    }

    #[test]
    fn test_from_reply_with_code_fences() {
        let reply = "```json\n{\"date\": \"2026-01-01\", \"amount\": \"€9.99\", \
                     \"merchant\": \"Kiosk\", \"description\": \"Paper\", \
                     \"category\": \"Extraordinary\", \"payment_method\": \"Cash\"}\n```";
        let fields = ReceiptFields::from_reply(reply).unwrap();
        assert_eq!(fields.amount.value(), Decimal::from_str("9.99").unwrap());
        assert_eq!(fields.merchant, "Kiosk");
    }

    #[test]
    fn test_from_reply_missing_fields_get_defaults() {
        let reply = r#"{"amount": 12.5}"#;
        let fields = ReceiptFields::from_reply(reply).unwrap();
        assert_eq!(fields.amount.value(), Decimal::from_str("12.5").unwrap());
        assert_eq!(fields.merchant, "Unspecified");
        assert_eq!(fields.category, "Unspecified");
        assert_eq!(fields.date, Local::now().date_naive());
    }

    #[test]
    fn test_from_reply_bad_amount_defaults_to_zero() {
        let reply = r#"{"date": "2026-01-01", "amount": "a lot"}"#;
        let fields = ReceiptFields::from_reply(reply).unwrap();
        assert!(fields.amount.is_zero());
    }

    #[test]
    fn test_from_reply_not_json_is_an_error() {
        assert!(ReceiptFields::from_reply("I could not read this receipt").is_err());
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{\"a\":1}\n```"), "{\"a\":1}");
    }

    #[test]
    fn test_extraction_prompt_lists_categories() {
        let prompt = extraction_prompt();
        for category in CATEGORIES {
            assert!(prompt.contains(category));
        }
    }

    #[tokio::test]
    async fn test_test_vision_pops_in_order() {
        let vision = TestVision::default();
        let first = vision.extract(b"img").await.unwrap();
        assert_eq!(first.merchant, "Mercadona");
        let second = vision.extract(b"img").await.unwrap();
        assert_eq!(second.merchant, "Cafetería Sol");
        assert!(vision.extract(b"img").await.is_err());
    }
}
