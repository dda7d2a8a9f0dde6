use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;
use thiserror::Error;

use super::session::UiState;
use crate::models::FoodAnalysis;

pub const BRAND: &str = "Kally";

/// Markdown code fence with an optional `json` tag.
static FENCE_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"```(?:json)?\s*([\s\S]*?)\s*```").ok());

const REQUIRED_FIELDS: [&str; 5] = ["name", "calories", "protein", "carbs", "fat"];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("response is not valid JSON: {0}")]
    Json(String),

    #[error("expected a JSON object")]
    NotAnObject,

    #[error("missing field '{0}'")]
    MissingField(&'static str),

    #[error("field 'name' must be a non-empty string")]
    InvalidName,

    #[error("field '{field}' is not a valid amount: {value}")]
    InvalidAmount { field: &'static str, value: String },
}

/// Strip markdown code fences wrapping a JSON payload, then trim.
pub fn clean_json_string(raw: &str) -> String {
    match FENCE_PATTERN.as_ref() {
        Some(re) => re.replace_all(raw, "$1").trim().to_string(),
        None => raw.trim().to_string(),
    }
}

/// Text to parse from a gateway body: a JSON string is used as-is,
/// any other value is re-serialized.
pub fn response_text(body: &Value) -> String {
    match body {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn parse_food_analysis(raw: &str) -> Result<FoodAnalysis, ParseError> {
    let cleaned = clean_json_string(raw);
    let value: Value = serde_json::from_str(&cleaned).map_err(|e| ParseError::Json(e.to_string()))?;
    let object = value.as_object().ok_or(ParseError::NotAnObject)?;

    for key in object.keys().filter(|k| !REQUIRED_FIELDS.contains(&k.as_str())) {
        log::debug!("Ignoring unexpected field '{}' in analysis", key);
    }

    let name = match object.get("name") {
        None | Some(Value::Null) => return Err(ParseError::MissingField("name")),
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(_) => return Err(ParseError::InvalidName),
    };

    Ok(FoodAnalysis {
        name,
        calories: amount(object, "calories")?,
        protein: amount(object, "protein")?,
        carbs: amount(object, "carbs")?,
        fat: amount(object, "fat")?,
    })
}

/// Read a non-negative amount. Numeric strings with a unit suffix
/// ("12g", "285 kcal", "1,250") are accepted.
fn amount(object: &Map<String, Value>, field: &'static str) -> Result<f64, ParseError> {
    let invalid = |value: &Value| ParseError::InvalidAmount {
        field,
        value: value.to_string(),
    };

    let value = match object.get(field) {
        None | Some(Value::Null) => return Err(ParseError::MissingField(field)),
        Some(v) => v,
    };

    let number = match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| invalid(value))?,
        Value::String(s) => parse_amount_str(s).ok_or_else(|| invalid(value))?,
        _ => return Err(invalid(value)),
    };

    if !number.is_finite() || number < 0.0 {
        return Err(invalid(value));
    }
    Ok(number)
}

fn parse_amount_str(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    let split = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == ','))
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);

    if !unit.trim().chars().all(|c| c.is_alphabetic()) {
        return None;
    }

    let cleaned = number.replace(',', "");
    if !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    cleaned.parse::<f64>().ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    /// Dish name tag, centered above the grid.
    Title,
    Grid { row: u8, col: u8 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverlayLabel {
    pub anchor: Anchor,
    pub text: String,
}

/// Fixed-position labels drawn over the captured photo.
pub fn overlay(analysis: &FoodAnalysis) -> Vec<OverlayLabel> {
    vec![
        OverlayLabel {
            anchor: Anchor::Title,
            text: analysis.name.clone(),
        },
        OverlayLabel {
            anchor: Anchor::Grid { row: 0, col: 0 },
            text: format!("Calories: {}", analysis.calories),
        },
        OverlayLabel {
            anchor: Anchor::Grid { row: 0, col: 1 },
            text: format!("Protein: {}g", analysis.protein),
        },
        OverlayLabel {
            anchor: Anchor::Grid { row: 1, col: 0 },
            text: format!("Carbs: {}g", analysis.carbs),
        },
        OverlayLabel {
            anchor: Anchor::Grid { row: 1, col: 1 },
            text: format!("Fat: {}g", analysis.fat),
        },
    ]
}

/// Terminal rendering of the current screen.
pub fn render(state: &UiState) -> String {
    let mut out = format!("==== {} ====\n", BRAND);

    match state {
        UiState::Idle => out.push_str("Starting camera...\n"),
        UiState::Previewing { stream } => {
            out.push_str(&format!("📷 Live preview ({})\n", stream.label()));
            out.push_str("[Enter] Take Photo   [q] Quit\n");
        }
        UiState::Capturing => out.push_str("Capturing...\n"),
        UiState::Analyzing { .. } => out.push_str("Analyzing your food...\n"),
        UiState::ShowingResult { photo, analysis } => {
            out.push_str(&format!("[photo {}x{}, {} bytes]\n", photo.width, photo.height, photo.bytes.len()));
            let labels = overlay(analysis);
            let cell = |row: u8, col: u8| {
                labels
                    .iter()
                    .find(|l| l.anchor == Anchor::Grid { row, col })
                    .map(|l| l.text.as_str())
                    .unwrap_or("")
            };
            out.push_str(&format!("   {}\n", analysis.name));
            for row in 0..2 {
                out.push_str(&format!("   {:<20}{}\n", cell(row, 0), cell(row, 1)));
            }
            out.push_str("[r] Take Another Photo   [q] Quit\n");
        }
        UiState::ShowingError { message, .. } => {
            out.push_str(&format!("{}\n", message));
            out.push_str("[r] Try Again   [q] Quit\n");
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_strips_json_fence() {
        assert_eq!(clean_json_string("```json\n{\"a\":1}\n```"), "{\"a\":1}");
    }

    #[test]
    fn test_clean_strips_untagged_fence_and_surrounding_whitespace() {
        assert_eq!(clean_json_string("  ```\n{\"a\": 1}\n```  \n"), "{\"a\": 1}");
        assert_eq!(clean_json_string("Here you go: ```json {\"a\":1} ```"), "Here you go: {\"a\":1}");
    }

    #[test]
    fn test_clean_without_fence_only_trims() {
        assert_eq!(clean_json_string("  {\"a\":1}\n"), "{\"a\":1}");
    }

    #[test]
    fn test_clean_is_idempotent() {
        let inputs = [
            "```json\n{\"name\":\"Pizza\"}\n```",
            "```\n[1, 2]\n```",
            "{\"plain\": true}",
            "   padded   ",
            "",
            "prefix ```json\n{}\n``` suffix",
        ];
        for input in inputs {
            let once = clean_json_string(input);
            assert_eq!(clean_json_string(&once), once, "input: {:?}", input);
        }
    }

    #[test]
    fn test_parse_exact_values() {
        let analysis =
            parse_food_analysis(r#"{"name":"Pizza","calories":285,"protein":12,"carbs":36,"fat":10}"#).unwrap();

        assert_eq!(
            analysis,
            FoodAnalysis {
                name: "Pizza".to_string(),
                calories: 285.0,
                protein: 12.0,
                carbs: 36.0,
                fat: 10.0,
            }
        );
    }

    #[test]
    fn test_parse_fenced_response() {
        let raw = "```json\n{\"name\":\"Ramen\",\"calories\":450.5,\"protein\":18,\"carbs\":60,\"fat\":14}\n```";
        let analysis = parse_food_analysis(raw).unwrap();
        assert_eq!(analysis.name, "Ramen");
        assert_eq!(analysis.calories, 450.5);
    }

    #[test]
    fn test_parse_accepts_amount_strings_and_extra_keys() {
        let raw = r#"{"name":"Menemen","calories":"1,250 kcal","protein":"12g","carbs":"8.5 g","fat":9,"confidence":0.8}"#;
        let analysis = parse_food_analysis(raw).unwrap();
        assert_eq!(analysis.calories, 1250.0);
        assert_eq!(analysis.protein, 12.0);
        assert_eq!(analysis.carbs, 8.5);
    }

    #[test]
    fn test_parse_rejects_truncated_json() {
        let err = parse_food_analysis(r#"{"name":"Pizza","calories":28"#).unwrap_err();
        assert!(matches!(err, ParseError::Json(_)));
    }

    #[test]
    fn test_parse_rejects_missing_and_invalid_fields() {
        assert_eq!(
            parse_food_analysis(r#"{"name":"Pizza","calories":285,"protein":12,"carbs":36}"#).unwrap_err(),
            ParseError::MissingField("fat")
        );
        assert_eq!(
            parse_food_analysis(r#"{"name":"","calories":1,"protein":1,"carbs":1,"fat":1}"#).unwrap_err(),
            ParseError::InvalidName
        );
        assert!(matches!(
            parse_food_analysis(r#"{"name":"X","calories":"lots","protein":1,"carbs":1,"fat":1}"#),
            Err(ParseError::InvalidAmount { field: "calories", .. })
        ));
        assert!(matches!(
            parse_food_analysis(r#"{"name":"X","calories":-5,"protein":1,"carbs":1,"fat":1}"#),
            Err(ParseError::InvalidAmount { field: "calories", .. })
        ));
        assert_eq!(parse_food_analysis("[1,2,3]").unwrap_err(), ParseError::NotAnObject);
    }

    #[test]
    fn test_response_text() {
        assert_eq!(response_text(&Value::String("```json\n{}\n```".to_string())), "```json\n{}\n```");
        assert_eq!(response_text(&serde_json::json!({"name": "Tea"})), r#"{"name":"Tea"}"#);
    }

    #[test]
    fn test_overlay_labels() {
        let analysis = FoodAnalysis {
            name: "Pizza".to_string(),
            calories: 285.0,
            protein: 12.0,
            carbs: 36.5,
            fat: 10.0,
        };
        let labels = overlay(&analysis);

        assert_eq!(labels[0].anchor, Anchor::Title);
        assert_eq!(labels[0].text, "Pizza");
        let texts: Vec<&str> = labels[1..].iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, ["Calories: 285", "Protein: 12g", "Carbs: 36.5g", "Fat: 10g"]);
    }

    #[test]
    fn test_render_error_offers_retry() {
        let state = UiState::ShowingError {
            message: "Error parsing food data.".to_string(),
            photo: None,
        };
        let screen = render(&state);
        assert!(screen.contains("Kally"));
        assert!(screen.contains("Error parsing food data."));
        assert!(screen.contains("Try Again"));
    }
}
