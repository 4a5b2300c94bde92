use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, USER_AGENT};
use serde::Deserialize;
use std::io::Read;
use std::thread;
use std::time::Duration;

use crate::config::{AppConfig, RETRY_BACKOFF_MS_MAX};
use crate::error::{AppError, AppResult};
use crate::models::CardData;

const GROUPS_FILE: &str = "Groups.csv";
const PRODUCTS_FILE: &str = "ProductsAndPrices.csv";
const CLIENT_USER_AGENT: &str = concat!("cardscan/", env!("CARGO_PKG_VERSION"));

pub trait CatalogSource {
  fn fetch_all_cards(&self) -> AppResult<Vec<CardData>>;
}

#[derive(Clone, Debug, PartialEq)]
pub struct GroupInfo {
  pub group_id: String,
  pub name: String,
}

#[derive(Deserialize)]
struct GroupRow {
  #[serde(rename = "groupId", default)]
  group_id: Option<String>,
  #[serde(default)]
  name: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ProductRow {
  #[serde(rename = "productId", default)]
  product_id: Option<String>,
  #[serde(default)]
  name: Option<String>,
  #[serde(rename = "cleanName", default)]
  clean_name: Option<String>,
  #[serde(rename = "imageUrl", default)]
  image_url: Option<String>,
  #[serde(rename = "groupId", default)]
  group_id: Option<String>,
  #[serde(rename = "categoryId", default)]
  category_id: Option<String>,
  #[serde(rename = "extNumber", default)]
  ext_number: Option<String>,
  #[serde(rename = "extRarity", default)]
  ext_rarity: Option<String>,
  #[serde(rename = "subTypeName", default)]
  sub_type_name: Option<String>,
  #[serde(rename = "marketPrice", default)]
  market_price: Option<String>,
}

fn non_blank(value: &Option<String>) -> Option<&str> {
  value.as_deref().map(str::trim).filter(|text| !text.is_empty())
}

fn csv_reader<R: Read>(input: R) -> csv::Reader<R> {
  csv::ReaderBuilder::new()
    .flexible(true)
    .trim(csv::Trim::Headers)
    .from_reader(input)
}

pub fn parse_groups_csv<R: Read>(input: R) -> AppResult<Vec<GroupInfo>> {
  let mut groups = Vec::new();
  for (index, row) in csv_reader(input).deserialize::<GroupRow>().enumerate() {
    let row = row?;
    match (non_blank(&row.group_id), non_blank(&row.name)) {
      (Some(group_id), Some(name)) => groups.push(GroupInfo {
        group_id: group_id.to_string(),
        name: name.to_string(),
      }),
      _ => log::warn!("Skipping group row {} with missing groupId or name", index + 2),
    }
  }
  Ok(groups)
}

fn combine_rarity(rarity: Option<&str>, sub_type: Option<&str>) -> String {
  match (rarity, sub_type) {
    (Some(rarity), Some(sub_type))
      if !rarity.to_lowercase().contains(&sub_type.to_lowercase()) =>
    {
      format!("{} ({})", rarity, sub_type)
    }
    (Some(rarity), _) => rarity.to_string(),
    (None, _) => String::new(),
  }
}

fn product_row_to_card(row: ProductRow, set_name: &str) -> Option<CardData> {
  let (Some(product_id), Some(name)) = (non_blank(&row.product_id), non_blank(&row.name)) else {
    log::warn!("Skipping product in '{}' with missing productId or name", set_name);
    return None;
  };

  let ext_number = non_blank(&row.ext_number);
  let ext_rarity = non_blank(&row.ext_rarity);
  if ext_number.is_none() && ext_rarity.is_none() {
    log::trace!("Skipping non-card product '{}' in '{}'", name, set_name);
    return None;
  }

  let Some(image_url) = non_blank(&row.image_url) else {
    log::warn!("Skipping '{}' in '{}' with missing imageUrl", name, set_name);
    return None;
  };

  Some(CardData {
    product_id: product_id.to_string(),
    name: name.to_string(),
    clean_name: non_blank(&row.clean_name).unwrap_or(name).to_string(),
    set_name: set_name.to_string(),
    image_url: image_url.to_string(),
    ext_number: ext_number.unwrap_or_default().to_string(),
    ext_rarity: combine_rarity(ext_rarity, non_blank(&row.sub_type_name)),
    group_id: non_blank(&row.group_id).and_then(|v| v.parse().ok()).unwrap_or(0),
    category_id: non_blank(&row.category_id).and_then(|v| v.parse().ok()).unwrap_or(0),
    market_price: non_blank(&row.market_price)
      .and_then(|v| v.parse::<f64>().ok())
      .filter(|price| price.is_finite() && *price >= 0.0)
      .unwrap_or(0.0),
  })
}

/// Rows that are not individual cards, or lack the fields a card needs, are
/// skipped. A malformed CSV record fails the whole group.
pub fn parse_products_csv<R: Read>(input: R, set_name: &str) -> AppResult<Vec<CardData>> {
  let mut cards = Vec::new();
  for row in csv_reader(input).deserialize::<ProductRow>() {
    if let Some(card) = product_row_to_card(row?, set_name) {
      cards.push(card);
    }
  }
  Ok(cards)
}

/// Transport failures, 5xx and 429 are worth another attempt; any other
/// status will not change on retry.
fn is_retryable(error: &AppError) -> bool {
  match error {
    AppError::Http(_) => true,
    AppError::Status { status, .. } => *status == 429 || *status >= 500,
    _ => false,
  }
}

pub struct TcgCsvDataSource {
  client: Client,
  base_url: String,
  fetch_attempts: u32,
  retry_backoff: Duration,
}

impl TcgCsvDataSource {
  pub fn new(config: &AppConfig) -> AppResult<Self> {
    let client = Client::builder()
      .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
      .build()?;

    Ok(Self {
      client,
      base_url: config.catalog_base_url.clone(),
      fetch_attempts: config.fetch_attempts.max(1),
      retry_backoff: Duration::from_millis(config.retry_backoff_ms.min(RETRY_BACKOFF_MS_MAX)),
    })
  }

  fn fetch_body_once(&self, url: &str) -> AppResult<String> {
    let response = self
      .client
      .get(url)
      .header(USER_AGENT, CLIENT_USER_AGENT)
      .header(ACCEPT, "text/csv,text/plain,*/*")
      .send()?;

    if !response.status().is_success() {
      return Err(AppError::Status {
        url: url.to_string(),
        status: response.status().as_u16(),
      });
    }

    Ok(response.text()?)
  }

  fn fetch_body(&self, url: &str) -> AppResult<String> {
    let mut attempt = 1;
    loop {
      match self.fetch_body_once(url) {
        Ok(body) => return Ok(body),
        Err(error) if attempt < self.fetch_attempts && is_retryable(&error) => {
          log::warn!(
            "Fetching {} failed (attempt {}/{}): {}",
            url,
            attempt,
            self.fetch_attempts,
            error
          );
          thread::sleep(self.retry_backoff.saturating_mul(attempt));
          attempt += 1;
        }
        Err(error) => return Err(error),
      }
    }
  }

  pub fn fetch_groups(&self) -> AppResult<Vec<GroupInfo>> {
    let url = format!("{}{}", self.base_url, GROUPS_FILE);
    log::debug!("Requesting groups index: {}", url);
    let body = self.fetch_body(&url)?;
    parse_groups_csv(body.as_bytes())
  }

  pub fn fetch_products_for_group(&self, group: &GroupInfo) -> AppResult<Vec<CardData>> {
    let url = format!("{}{}/{}", self.base_url, group.group_id, PRODUCTS_FILE);
    log::debug!("Requesting products for '{}': {}", group.name, url);
    let body = self.fetch_body(&url)?;
    parse_products_csv(body.as_bytes(), &group.name)
  }
}

impl CatalogSource for TcgCsvDataSource {
  fn fetch_all_cards(&self) -> AppResult<Vec<CardData>> {
    let groups = self.fetch_groups()?;
    log::info!("Fetched {} groups from {}", groups.len(), self.base_url);

    let mut all_cards = Vec::new();
    for group in &groups {
      let cards = self.fetch_products_for_group(group)?;
      log::debug!("Fetched {} cards for '{}'", cards.len(), group.name);
      all_cards.extend(cards);
    }

    log::info!("Finished fetching catalog: {} cards", all_cards.len());
    Ok(all_cards)
  }
}

pub struct StaticCatalogSource {
  cards: Vec<CardData>,
}

impl StaticCatalogSource {
  pub fn new(cards: Vec<CardData>) -> Self {
    Self { cards }
  }
}

impl CatalogSource for StaticCatalogSource {
  fn fetch_all_cards(&self) -> AppResult<Vec<CardData>> {
    Ok(self.cards.clone())
  }
}

/// Never fails: errors are logged and reported as an empty catalog.
pub fn preload_all_cards(source: &dyn CatalogSource) -> Vec<CardData> {
  match source.fetch_all_cards() {
    Ok(cards) => {
      log::info!("Loaded {} cards from catalog source", cards.len());
      cards
    }
    Err(error) => {
      log::error!("Error loading catalog: {}", error);
      Vec::new()
    }
  }
}
