//! Single-call tasks: summarize, translate, write code, free-form, the
//! image tasks (describe, meal calories, invoice extraction), and chat.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{describe, Error, Result};
use crate::generation::{ChatTurn, GenerationOptions, GenerationProvider, ImagePart};
use crate::prompt::PromptTemplate;

const SUMMARY_TEMPLATE: &str = "Summarize the following text. Keep the summary {length}.\n\n{text}";
const TRANSLATE_TEMPLATE: &str =
    "Translate the following text to {language}. Reply with the translation only.\n\n{text}";
const CODE_TEMPLATE: &str = "Write {language} code for: {description}";

const DESCRIBE_IMAGE_PROMPT: &str = "Analyze this image in detail. Describe what you see.";
const MEAL_DEFAULT_REQUEST: &str = "Analyze this food image and provide calorie information.";
const INVOICE_DEFAULT_REQUEST: &str = "Please extract all information from this invoice.";

/// Conversation turns sent per chat call, counting the new message.
pub const CHAT_CONTEXT_TURNS: usize = 20;
pub const CHAT_TEMPERATURE: f32 = 0.7;
pub const CHAT_MAX_TOKENS: u32 = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryLength {
    Short,
    #[default]
    Medium,
    Long,
}

impl SummaryLength {
    fn instruction(self) -> &'static str {
        match self {
            SummaryLength::Short => "short, two or three sentences",
            SummaryLength::Medium => "medium length, one paragraph",
            SummaryLength::Long => "long, covering every main point",
        }
    }
}

impl fmt::Display for SummaryLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SummaryLength::Short => "short",
            SummaryLength::Medium => "medium",
            SummaryLength::Long => "long",
        };
        f.write_str(s)
    }
}

impl FromStr for SummaryLength {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "short" => Ok(SummaryLength::Short),
            "medium" => Ok(SummaryLength::Medium),
            "long" => Ok(SummaryLength::Long),
            other => Err(Error::InvalidConfiguration(format!(
                "unknown summary length '{}' (expected short, medium or long)",
                other
            ))),
        }
    }
}

/// What to report about a meal photo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MealAnalysis {
    #[default]
    Total,
    Breakdown,
    Nutrition,
}

impl MealAnalysis {
    fn instruction(self) -> &'static str {
        match self {
            MealAnalysis::Total => {
                "You are an expert nutritionist. Analyze the food items in the image and \
                 calculate the total calorie intake. Provide a detailed breakdown of each food \
                 item with estimated calories. Format: Present as a clear list with item name \
                 and calorie count."
            }
            MealAnalysis::Breakdown => {
                "You are an expert nutritionist. For every food item in the image give: \
                 1. the item name, 2. the estimated portion size, 3. the calories for that \
                 item. Then give the total calories and the key nutrients of the meal."
            }
            MealAnalysis::Nutrition => {
                "You are an expert nutritionist. Identify the food items in the image and \
                 estimate their calories. Give the macronutrient split (carbohydrates, \
                 protein, fat) as percentages, health recommendations for this meal, and a \
                 short summary."
            }
        }
    }
}

impl fmt::Display for MealAnalysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MealAnalysis::Total => "total",
            MealAnalysis::Breakdown => "breakdown",
            MealAnalysis::Nutrition => "nutrition",
        };
        f.write_str(s)
    }
}

impl FromStr for MealAnalysis {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "total" => Ok(MealAnalysis::Total),
            "breakdown" => Ok(MealAnalysis::Breakdown),
            "nutrition" => Ok(MealAnalysis::Nutrition),
            other => Err(Error::InvalidConfiguration(format!(
                "unknown meal analysis '{}' (expected total, breakdown or nutrition)",
                other
            ))),
        }
    }
}

/// Which part of an invoice to extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InvoiceExtraction {
    #[default]
    Full,
    LineItems,
    Totals,
    Vendor,
    /// Answer a free-form request about the invoice.
    Custom,
}

impl InvoiceExtraction {
    fn instruction(self) -> &'static str {
        match self {
            InvoiceExtraction::Full => {
                "You are an expert in understanding invoices. Extract from the invoice image: \
                 the vendor, the invoice number and date, every line item, the subtotal, \
                 taxes, discounts and total, the payment terms, and the customer."
            }
            InvoiceExtraction::LineItems => {
                "You are an expert in understanding invoices. List every line item of the \
                 invoice image as a table with columns: item name, quantity, unit price, total."
            }
            InvoiceExtraction::Totals => {
                "You are an expert in understanding invoices. Extract the subtotal, tax, \
                 discounts, final total and currency from the invoice image."
            }
            InvoiceExtraction::Vendor => {
                "You are an expert in understanding invoices. Extract the vendor name, \
                 address, phone, email, invoice number and invoice date from the invoice image."
            }
            InvoiceExtraction::Custom => {
                "You are an expert in understanding invoices. Answer the request below from \
                 the invoice image, professionally and precisely."
            }
        }
    }
}

impl fmt::Display for InvoiceExtraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InvoiceExtraction::Full => "full",
            InvoiceExtraction::LineItems => "line-items",
            InvoiceExtraction::Totals => "totals",
            InvoiceExtraction::Vendor => "vendor",
            InvoiceExtraction::Custom => "custom",
        };
        f.write_str(s)
    }
}

impl FromStr for InvoiceExtraction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "full" => Ok(InvoiceExtraction::Full),
            "line-items" | "line_items" => Ok(InvoiceExtraction::LineItems),
            "totals" => Ok(InvoiceExtraction::Totals),
            "vendor" => Ok(InvoiceExtraction::Vendor),
            "custom" => Ok(InvoiceExtraction::Custom),
            other => Err(Error::InvalidConfiguration(format!(
                "unknown invoice extraction '{}' (expected full, line-items, totals, vendor or custom)",
                other
            ))),
        }
    }
}

async fn run(
    generator: &dyn GenerationProvider,
    template: &str,
    values: &[(&str, &str)],
    options: &GenerationOptions,
) -> Result<String> {
    let prompt = PromptTemplate::parse(template)
        .and_then(|t| t.render(values))
        .map_err(|e| Error::Generation(format!("bad prompt template: {}", e)))?;
    generator
        .generate(&prompt, options)
        .await
        .map_err(|e| Error::Generation(describe(&e)))
}

pub async fn summarize(
    generator: &dyn GenerationProvider,
    text: &str,
    length: SummaryLength,
    options: &GenerationOptions,
) -> Result<String> {
    run(
        generator,
        SUMMARY_TEMPLATE,
        &[("length", length.instruction()), ("text", text)],
        options,
    )
    .await
}

pub async fn translate_text(
    generator: &dyn GenerationProvider,
    text: &str,
    target_language: &str,
    options: &GenerationOptions,
) -> Result<String> {
    if target_language.trim().is_empty() {
        return Err(Error::InvalidConfiguration(
            "target language must not be empty".to_string(),
        ));
    }
    run(
        generator,
        TRANSLATE_TEMPLATE,
        &[("language", target_language), ("text", text)],
        options,
    )
    .await
}

pub async fn generate_code(
    generator: &dyn GenerationProvider,
    description: &str,
    language: &str,
    options: &GenerationOptions,
) -> Result<String> {
    run(
        generator,
        CODE_TEMPLATE,
        &[("language", language), ("description", description)],
        options,
    )
    .await
}

/// Free-form generation; the prompt is sent as-is.
pub async fn generate(
    generator: &dyn GenerationProvider,
    prompt: &str,
    options: &GenerationOptions,
) -> Result<String> {
    generator
        .generate(prompt, options)
        .await
        .map_err(|e| Error::Generation(describe(&e)))
}

fn non_empty(text: Option<&str>) -> Option<&str> {
    text.map(str::trim).filter(|t| !t.is_empty())
}

async fn run_with_images(
    generator: &dyn GenerationProvider,
    prompt: &str,
    images: &[ImagePart],
    options: &GenerationOptions,
) -> Result<String> {
    if images.is_empty() {
        return Err(Error::InvalidConfiguration(
            "at least one image is required".to_string(),
        ));
    }
    generator
        .generate_with_images(prompt, images, options)
        .await
        .map_err(|e| Error::Generation(describe(&e)))
}

/// Describe the images, answering `question` about them when given.
pub async fn describe_image(
    generator: &dyn GenerationProvider,
    images: &[ImagePart],
    question: Option<&str>,
    options: &GenerationOptions,
) -> Result<String> {
    let prompt = match non_empty(question) {
        Some(q) => format!("{}\n\n{}", DESCRIBE_IMAGE_PROMPT, q),
        None => DESCRIBE_IMAGE_PROMPT.to_string(),
    };
    run_with_images(generator, &prompt, images, options).await
}

/// Estimate the calories of the meal in the images.
pub async fn analyze_meal(
    generator: &dyn GenerationProvider,
    images: &[ImagePart],
    analysis: MealAnalysis,
    request: Option<&str>,
    options: &GenerationOptions,
) -> Result<String> {
    let request = non_empty(request).unwrap_or(MEAL_DEFAULT_REQUEST);
    let prompt = format!("{}\n\n{}", analysis.instruction(), request);
    run_with_images(generator, &prompt, images, options).await
}

/// Pull structured fields out of invoice images.
///
/// [`InvoiceExtraction::Custom`] requires a `request`.
pub async fn extract_invoice(
    generator: &dyn GenerationProvider,
    images: &[ImagePart],
    extraction: InvoiceExtraction,
    request: Option<&str>,
    options: &GenerationOptions,
) -> Result<String> {
    let request = match (extraction, non_empty(request)) {
        (_, Some(r)) => r,
        (InvoiceExtraction::Custom, None) => {
            return Err(Error::InvalidConfiguration(
                "a custom invoice extraction needs a request".to_string(),
            ))
        }
        (_, None) => INVOICE_DEFAULT_REQUEST,
    };
    let prompt = format!("{}\n\n{}", extraction.instruction(), request);
    run_with_images(generator, &prompt, images, options).await
}

/// Reply to `message` given the earlier turns of the conversation.
///
/// Only the most recent [`CHAT_CONTEXT_TURNS`] turns, the new message
/// included, are sent.
pub async fn chat(
    generator: &dyn GenerationProvider,
    history: &[ChatTurn],
    message: &str,
    options: &GenerationOptions,
) -> Result<String> {
    if message.trim().is_empty() {
        return Err(Error::InvalidConfiguration(
            "chat message must not be empty".to_string(),
        ));
    }
    let keep = CHAT_CONTEXT_TURNS.saturating_sub(1);
    let start = history.len().saturating_sub(keep);
    let mut turns = history[start..].to_vec();
    turns.push(ChatTurn::user(message));
    generator
        .chat(&turns, options)
        .await
        .map_err(|e| Error::Generation(describe(&e)))
}
