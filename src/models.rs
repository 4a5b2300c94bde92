use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct CardData {
  pub product_id: String,
  pub name: String,
  pub clean_name: String,
  pub set_name: String,
  pub image_url: String,
  pub ext_number: String,
  pub ext_rarity: String,
  pub group_id: i64,
  pub category_id: i64,
  pub market_price: f64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CollectionCard {
  #[serde(flatten)]
  pub card: CardData,
  pub count: i64,
  pub added_at: String,
  pub updated_at: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSummaryDto {
  pub distinct_cards: i64,
  pub total_cards: i64,
  pub total_value: f64,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SortType {
  PriceLowToHigh,
  PriceHighToLow,
  CardNumberLowToHigh,
  CardNumberHighToLow,
  NameAToZ,
  NameZToA,
  RarityLowToHigh,
  RarityHighToLow,
  #[default]
  None,
}

impl SortType {
  pub fn compare(self, a: &CardData, b: &CardData) -> Ordering {
    match self {
      SortType::PriceLowToHigh => a.market_price.total_cmp(&b.market_price),
      SortType::PriceHighToLow => b.market_price.total_cmp(&a.market_price),
      SortType::CardNumberLowToHigh => a.ext_number.cmp(&b.ext_number),
      SortType::CardNumberHighToLow => b.ext_number.cmp(&a.ext_number),
      SortType::NameAToZ | SortType::None => a.name.cmp(&b.name),
      SortType::NameZToA => b.name.cmp(&a.name),
      SortType::RarityLowToHigh => rarity_rank(&a.ext_rarity).cmp(&rarity_rank(&b.ext_rarity)),
      SortType::RarityHighToLow => rarity_rank(&b.ext_rarity).cmp(&rarity_rank(&a.ext_rarity)),
    }
  }
}

/// Lower is more common. Unknown rarities sort last. A trailing edition
/// suffix such as `"Rare (1st Edition)"` is ignored.
pub fn rarity_rank(rarity: &str) -> u8 {
  let base = rarity.split(" (").next().unwrap_or_default();
  match base.trim().to_lowercase().as_str() {
    "common" => 1,
    "short print" => 2,
    "rare" => 3,
    "super rare" => 4,
    "ultra rare" => 5,
    "secret rare" => 6,
    "ultimate rare" => 7,
    "ghost rare" => 8,
    "collector's rare" => 9,
    "starlight rare" => 10,
    _ => 99,
  }
}

pub fn apply_sort_and_filter(cards: &[CardData], query: &str, sort: SortType) -> Vec<CardData> {
  apply_sort_and_filter_by(cards.to_vec(), query, sort, |card| card)
}

/// Same as [`apply_sort_and_filter`] for rows that wrap a card.
pub fn apply_sort_and_filter_by<T, F>(items: Vec<T>, query: &str, sort: SortType, card_of: F) -> Vec<T>
where
  F: Fn(&T) -> &CardData,
{
  let needle = query.trim().to_lowercase();
  let mut filtered: Vec<T> = items
    .into_iter()
    .filter(|item| needle.is_empty() || card_of(item).name.to_lowercase().contains(&needle))
    .collect();
  filtered.sort_by(|a, b| sort.compare(card_of(a), card_of(b)));
  filtered
}

#[cfg(test)]
pub(crate) fn sample_cards() -> Vec<CardData> {
  let card = |product_id: &str, name: &str, ext_number: &str, ext_rarity: &str, market_price: f64| CardData {
    product_id: product_id.to_string(),
    name: name.to_string(),
    clean_name: name.replace('-', " ").replace('.', ""),
    set_name: "Starter Deck: Joey".to_string(),
    image_url: format!("https://tcgplayer-cdn.tcgplayer.com/product/{}_200w.jpg", product_id),
    ext_number: ext_number.to_string(),
    ext_rarity: ext_rarity.to_string(),
    group_id: 293,
    category_id: 2,
    market_price,
  };

  vec![
    card("22984", "Red-Eyes B. Dragon", "SDJ-001", "Ultra Rare", 6.0),
    card("22985", "Swordsman of Landstar", "SDJ-002", "Common", 0.28),
    card("22986", "Baby Dragon", "SDJ-003", "Common", 0.43),
    card("22987", "Spirit of the Harp", "SDJ-004", "Common (1st Edition)", 0.29),
  ]
}
