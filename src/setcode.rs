//! Set-code extraction from recognised card text.
//!
//! Text recognition itself happens outside this crate. A recogniser hands back
//! ordered blocks of lines, and the first line containing something shaped
//! like `SDJ-001` or `LOB-EN001` decides the scan.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use crate::error::AppResult;

const SET_CODE_PATTERN: &str = r"(?i)([A-Z]{2,4})([\s\-]*)([A-Z]{0,3}[0-9]{3})";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct TextBlock {
  pub lines: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct RecognizedText {
  pub blocks: Vec<TextBlock>,
}

impl RecognizedText {
  /// Blank lines separate blocks; every other line is kept as-is.
  pub fn from_plain_text(text: &str) -> Self {
    let mut blocks = Vec::new();
    let mut current = TextBlock::default();

    for line in text.lines() {
      if line.trim().is_empty() {
        if !current.lines.is_empty() {
          blocks.push(std::mem::take(&mut current));
        }
        continue;
      }
      current.lines.push(line.to_string());
    }
    if !current.lines.is_empty() {
      blocks.push(current);
    }

    Self { blocks }
  }

  pub fn full_text(&self) -> String {
    self
      .blocks
      .iter()
      .map(|block| block.lines.join("\n"))
      .collect::<Vec<_>>()
      .join("\n\n")
  }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SetCodeMatch {
  pub raw: String,
  pub canonical: String,
}

fn set_code_regex() -> &'static Regex {
  static PATTERN: OnceLock<Regex> = OnceLock::new();
  PATTERN.get_or_init(|| Regex::new(SET_CODE_PATTERN).expect("set code pattern is valid"))
}

pub fn match_set_code(line: &str) -> Option<SetCodeMatch> {
  let captures = set_code_regex().captures(line)?;
  let raw = captures.get(0)?.as_str().to_string();
  let prefix = captures.get(1)?.as_str().to_uppercase();
  let separator = captures.get(2).map(|m| m.as_str()).unwrap_or_default();
  let rest = captures.get(3)?.as_str().to_uppercase();

  let canonical = if separator.is_empty() {
    format!("{}{}", prefix, rest)
  } else {
    format!("{}-{}", prefix, rest)
  };

  Some(SetCodeMatch { raw, canonical })
}

/// Block order, then line order; stops at the first hit.
pub fn find_set_code(text: &RecognizedText) -> Option<SetCodeMatch> {
  for block in &text.blocks {
    log::trace!("Block text: {}", block.lines.join(" | "));
    for line in &block.lines {
      if let Some(found) = match_set_code(line) {
        log::debug!("Set code {} matched in line '{}'", found.canonical, line);
        return Some(found);
      }
    }
  }
  log::debug!("Set code not found in:\n{}", text.full_text());
  None
}

pub trait TextRecognizer {
  fn recognize(&self, image: &Path) -> AppResult<RecognizedText>;
}

/// Treats the input file as an already-recognised frame: UTF-8 text, either
/// plain (blank-line separated blocks) or the JSON form of [`RecognizedText`].
pub struct PlainTextRecognizer;

impl TextRecognizer for PlainTextRecognizer {
  fn recognize(&self, image: &Path) -> AppResult<RecognizedText> {
    let text = fs::read_to_string(image)?;
    if text.trim_start().starts_with('{') {
      match serde_json::from_str::<RecognizedText>(&text) {
        Ok(recognized) => return Ok(recognized),
        Err(error) => log::debug!("{} is not a JSON frame ({}), reading as text", image.display(), error),
      }
    }
    Ok(RecognizedText::from_plain_text(&text))
  }
}
