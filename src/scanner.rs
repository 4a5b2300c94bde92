//! Scan session: set code -> cached card -> review list.

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::cache;
use crate::collection::add_card_to_collection;
use crate::error::AppResult;
use crate::models::CardData;
use crate::setcode::{find_set_code, RecognizedText};

pub const SET_CODE_NOT_FOUND: &str = "Set code not found";
pub const CARD_NOT_FOUND: &str = "Card not found";

pub trait CardLookup {
  fn find_card_by_set_code(&self, set_code: &str) -> AppResult<Option<CardData>>;
}

impl CardLookup for Connection {
  fn find_card_by_set_code(&self, set_code: &str) -> AppResult<Option<CardData>> {
    cache::find_card_by_set_code(self, set_code)
  }
}

impl CardLookup for [CardData] {
  fn find_card_by_set_code(&self, set_code: &str) -> AppResult<Option<CardData>> {
    let code = set_code.trim();
    Ok(
      self
        .iter()
        .find(|card| card.ext_number.eq_ignore_ascii_case(code))
        .cloned(),
    )
  }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
#[serde(tag = "state", content = "message", rename_all = "camelCase")]
pub enum ScanningState {
  #[default]
  Idle,
  Scanning,
  ReadyForReview,
  Error(String),
}

#[derive(Debug, Default)]
pub struct ScanSession {
  state: ScanningState,
  scanned_cards: Vec<CardData>,
  scanned_ids: HashSet<String>,
  last_set_code: Option<String>,
  capturing: bool,
}

impl ScanSession {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn state(&self) -> &ScanningState {
    &self.state
  }

  pub fn scanned_cards(&self) -> &[CardData] {
    &self.scanned_cards
  }

  /// Canonical set code read from the most recent frame, if any.
  pub fn last_set_code(&self) -> Option<&str> {
    self.last_set_code.as_deref()
  }

  pub fn is_capturing(&self) -> bool {
    self.capturing
  }

  pub fn capture_image(&mut self) {
    if !self.capturing {
      self.capturing = true;
      self.state = ScanningState::Scanning;
    }
  }

  /// Handles one recognised frame. Returns the card that was matched, whether
  /// or not it was new to this session.
  pub fn on_image_captured<L: CardLookup + ?Sized>(
    &mut self,
    lookup: &L,
    text: &RecognizedText,
  ) -> Option<CardData> {
    self.capturing = false;
    self.last_set_code = find_set_code(text).map(|found| found.canonical);
    match self.last_set_code.clone() {
      Some(set_code) => self.search_card_by_set_code(lookup, &set_code),
      None => {
        self.state = ScanningState::Error(SET_CODE_NOT_FOUND.to_string());
        None
      }
    }
  }

  pub fn search_card_by_set_code<L: CardLookup + ?Sized>(
    &mut self,
    lookup: &L,
    set_code: &str,
  ) -> Option<CardData> {
    self.state = ScanningState::Scanning;
    match lookup.find_card_by_set_code(set_code) {
      Ok(Some(card)) => {
        log::info!("Found card: {} ({})", card.name, card.ext_number);
        if self.scanned_ids.insert(card.product_id.clone()) {
          self.scanned_cards.push(card.clone());
        }
        self.state = ScanningState::Idle;
        Some(card)
      }
      Ok(None) => {
        log::info!("No cached card for set code {}", set_code);
        self.state = ScanningState::Error(CARD_NOT_FOUND.to_string());
        None
      }
      Err(error) => {
        log::error!("Lookup for {} failed: {}", set_code, error);
        self.state = ScanningState::Error(error.to_string());
        None
      }
    }
  }

  pub fn move_to_review(&mut self) {
    self.state = ScanningState::ReadyForReview;
  }

  pub fn reset_scanning_state(&mut self) {
    self.state = ScanningState::Idle;
  }

  pub fn set_error(&mut self, message: impl Into<String>) {
    self.capturing = false;
    self.last_set_code = None;
    self.state = ScanningState::Error(message.into());
  }

  pub fn clear_scanned_cards(&mut self) {
    self.scanned_cards.clear();
    self.scanned_ids.clear();
  }

  /// Adds each reviewed card to the collection once, then empties the
  /// session. Returns how many cards were added.
  pub fn commit_to_collection(&mut self, connection: &mut Connection) -> AppResult<usize> {
    let tx = connection.transaction()?;
    for card in &self.scanned_cards {
      add_card_to_collection(&tx, card)?;
    }
    tx.commit()?;

    let added = self.scanned_cards.len();
    self.clear_scanned_cards();
    self.state = ScanningState::Idle;
    Ok(added)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::cache_cards;
  use crate::collection::get_all_cards_from_collection;
  use crate::db::open_in_memory;
  use crate::error::AppError;
  use crate::models::sample_cards;

  struct BrokenLookup;

  impl CardLookup for BrokenLookup {
    fn find_card_by_set_code(&self, _set_code: &str) -> AppResult<Option<CardData>> {
      Err(AppError::Validation("cache unavailable".to_string()))
    }
  }

  #[test]
  fn same_card_twice_is_listed_once() {
    let cards = sample_cards();
    let mut session = ScanSession::new();

    assert!(session.search_card_by_set_code(cards.as_slice(), "SDJ-001").is_some());
    assert!(session.search_card_by_set_code(cards.as_slice(), "sdj-001").is_some());
    assert!(session.search_card_by_set_code(cards.as_slice(), "SDJ-002").is_some());

    let ids: Vec<&str> = session.scanned_cards().iter().map(|c| c.product_id.as_str()).collect();
    assert_eq!(ids, vec!["22984", "22985"]);
    assert_eq!(session.state(), &ScanningState::Idle);
  }

  #[test]
  fn miss_surfaces_error_without_adding() {
    let cards = sample_cards();
    let mut session = ScanSession::new();

    assert!(session.search_card_by_set_code(cards.as_slice(), "LOB-001").is_none());
    assert_eq!(session.state(), &ScanningState::Error(CARD_NOT_FOUND.to_string()));
    assert!(session.scanned_cards().is_empty());

    session.reset_scanning_state();
    assert_eq!(session.state(), &ScanningState::Idle);
  }

  #[test]
  fn lookup_failure_becomes_error_state() {
    let mut session = ScanSession::new();
    assert!(session.search_card_by_set_code(&BrokenLookup, "SDJ-001").is_none());
    assert_eq!(session.state(), &ScanningState::Error("cache unavailable".to_string()));
  }

  #[test]
  fn capture_flow_matches_recognised_text() {
    let cards = sample_cards();
    let mut session = ScanSession::new();

    session.capture_image();
    assert!(session.is_capturing());
    assert_eq!(session.state(), &ScanningState::Scanning);

    let text = RecognizedText::from_plain_text("Baby Dragon\n[Dragon]\n\nsdj 003\n");
    let card = session.on_image_captured(cards.as_slice(), &text).unwrap();
    assert_eq!(card.product_id, "22986");
    assert!(!session.is_capturing());
    assert_eq!(session.last_set_code(), Some("SDJ-003"));
    assert_eq!(session.state(), &ScanningState::Idle);
  }

  #[test]
  fn frame_without_code_is_an_error() {
    let cards = sample_cards();
    let mut session = ScanSession::new();
    session.capture_image();

    let text = RecognizedText::from_plain_text("blurry\nnothing here");
    assert!(session.on_image_captured(cards.as_slice(), &text).is_none());
    assert_eq!(session.last_set_code(), None);
    assert_eq!(session.state(), &ScanningState::Error(SET_CODE_NOT_FOUND.to_string()));
  }

  #[test]
  fn review_and_commit_adds_each_card_once() {
    let mut connection = open_in_memory().unwrap();
    cache_cards(&mut connection, &sample_cards()).unwrap();

    let mut session = ScanSession::new();
    session.search_card_by_set_code(&connection, "SDJ-001");
    session.search_card_by_set_code(&connection, "SDJ-001");
    session.search_card_by_set_code(&connection, "SDJ-004");
    session.move_to_review();
    assert_eq!(session.state(), &ScanningState::ReadyForReview);

    assert_eq!(session.commit_to_collection(&mut connection).unwrap(), 2);
    assert!(session.scanned_cards().is_empty());

    let owned = get_all_cards_from_collection(&connection).unwrap();
    assert_eq!(owned.len(), 2);
    assert!(owned.iter().all(|row| row.count == 1));
  }

  #[test]
  fn state_serializes_with_message() {
    let json = serde_json::to_string(&ScanningState::Error(CARD_NOT_FOUND.to_string())).unwrap();
    assert_eq!(json, r#"{"state":"error","message":"Card not found"}"#);
    let idle = serde_json::to_string(&ScanningState::ReadyForReview).unwrap();
    assert_eq!(idle, r#"{"state":"readyForReview"}"#);
  }
}
