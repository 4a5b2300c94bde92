use cardscan_lib::cache::{count_cached_cards, count_refresh_history, find_card_by_set_code};
use cardscan_lib::catalog::{CatalogSource, TcgCsvDataSource};
use cardscan_lib::db::open_database;
use cardscan_lib::{sync_catalog, AppConfig, AppError, AppState};

const GROUPS_CSV: &str = "\
groupId,name,abbreviation,isSupplemental,publishedOn,modifiedOn,categoryId
293,Starter Deck: Joey,SDJ,False,2002-10-20T00:00:00,2024-01-01T00:00:00,2
294,Legend of Blue Eyes White Dragon,LOB,False,2002-03-08T00:00:00,2024-01-01T00:00:00,2
";

const SDJ_CSV: &str = "\
productId,name,cleanName,imageUrl,categoryId,groupId,extRarity,extNumber,marketPrice,subTypeName
22984,Red-Eyes B. Dragon,Red Eyes B Dragon,https://img/22984_200w.jpg,2,293,Ultra Rare,SDJ-001,6.00,Unlimited
22985,Swordsman of Landstar,Swordsman of Landstar,https://img/22985_200w.jpg,2,293,Common,SDJ-002,0.28,Unlimited
30001,Starter Deck: Joey Display,Starter Deck Joey Display,https://img/30001_200w.jpg,2,293,,,120.00,Normal
";

const LOB_CSV: &str = "\
productId,name,cleanName,imageUrl,categoryId,groupId,extRarity,extNumber,marketPrice,subTypeName
21774,Blue-Eyes White Dragon,Blue Eyes White Dragon,https://img/21774_200w.jpg,2,294,Ultra Rare,LOB-001,45.10,Unlimited
";

fn init() {
  let _ = env_logger::builder().is_test(true).try_init();
}

fn config_for(server: &mockito::Server, data_dir: &std::path::Path) -> AppConfig {
  AppConfig {
    data_dir: data_dir.to_path_buf(),
    catalog_base_url: format!("{}/", server.url()),
    request_timeout_secs: 5,
    fetch_attempts: 2,
    retry_backoff_ms: 0,
    ..AppConfig::default()
  }
}

#[test]
fn fetches_every_group_from_the_index() {
  init();
  let mut server = mockito::Server::new();
  let groups = server.mock("GET", "/Groups.csv").with_status(200).with_body(GROUPS_CSV).create();
  let sdj = server
    .mock("GET", "/293/ProductsAndPrices.csv")
    .with_status(200)
    .with_body(SDJ_CSV)
    .create();
  let lob = server
    .mock("GET", "/294/ProductsAndPrices.csv")
    .with_status(200)
    .with_body(LOB_CSV)
    .create();

  let dir = tempfile::tempdir().unwrap();
  let source = TcgCsvDataSource::new(&config_for(&server, dir.path())).unwrap();
  let cards = source.fetch_all_cards().unwrap();

  groups.assert();
  sdj.assert();
  lob.assert();

  let codes: Vec<&str> = cards.iter().map(|card| card.ext_number.as_str()).collect();
  assert_eq!(codes, vec!["SDJ-001", "SDJ-002", "LOB-001"]);
  assert_eq!(cards[2].set_name, "Legend of Blue Eyes White Dragon");
  assert_eq!(cards[0].ext_rarity, "Ultra Rare (Unlimited)");
}

#[test]
fn lazy_sync_mirrors_catalog_once() {
  init();
  let mut server = mockito::Server::new();
  let groups = server
    .mock("GET", "/Groups.csv")
    .with_status(200)
    .with_body(GROUPS_CSV)
    .expect(1)
    .create();
  server
    .mock("GET", "/293/ProductsAndPrices.csv")
    .with_status(200)
    .with_body(SDJ_CSV)
    .create();
  server
    .mock("GET", "/294/ProductsAndPrices.csv")
    .with_status(200)
    .with_body(LOB_CSV)
    .create();

  let dir = tempfile::tempdir().unwrap();
  let state = AppState::initialize(config_for(&server, dir.path())).unwrap();
  let source = state.catalog_source().unwrap();

  let first = sync_catalog(&state, &source, false).unwrap();
  assert!(first.applied);
  assert_eq!(first.total_records, 3);

  let second = sync_catalog(&state, &source, false).unwrap();
  assert!(!second.applied);
  assert_eq!(second.total_records, 3);
  groups.assert();

  let connection = open_database(&state.db_path).unwrap();
  let card = find_card_by_set_code(&connection, "lob-001").unwrap().unwrap();
  assert_eq!(card.product_id, "21774");
}

#[test]
fn failing_group_leaves_cache_empty() {
  init();
  let mut server = mockito::Server::new();
  server.mock("GET", "/Groups.csv").with_status(200).with_body(GROUPS_CSV).create();
  server
    .mock("GET", "/293/ProductsAndPrices.csv")
    .with_status(200)
    .with_body(SDJ_CSV)
    .create();
  let broken = server
    .mock("GET", "/294/ProductsAndPrices.csv")
    .with_status(502)
    .expect(4)
    .create();

  let dir = tempfile::tempdir().unwrap();
  let state = AppState::initialize(config_for(&server, dir.path())).unwrap();
  let source = state.catalog_source().unwrap();

  let err = source.fetch_all_cards().unwrap_err();
  assert!(matches!(err, AppError::Status { status: 502, .. }));

  let result = sync_catalog(&state, &source, false).unwrap();
  assert!(!result.applied);
  assert_eq!(result.total_records, 0);

  let connection = open_database(&state.db_path).unwrap();
  assert_eq!(count_cached_cards(&connection).unwrap(), 0);
  assert_eq!(count_refresh_history(&connection).unwrap(), 0);

  // two fetches, each retried once
  broken.assert();
}

#[test]
fn persistent_failure_is_retried_then_reported() {
  init();
  let mut server = mockito::Server::new();
  let unavailable = server
    .mock("GET", "/Groups.csv")
    .with_status(503)
    .expect(2)
    .create();

  let dir = tempfile::tempdir().unwrap();
  let source = TcgCsvDataSource::new(&config_for(&server, dir.path())).unwrap();

  let err = source.fetch_groups().unwrap_err();
  assert!(matches!(err, AppError::Status { status: 503, .. }));
  unavailable.assert();
}

#[test]
fn missing_file_is_not_retried() {
  init();
  let mut server = mockito::Server::new();
  let missing = server
    .mock("GET", "/Groups.csv")
    .with_status(404)
    .expect(1)
    .create();

  let dir = tempfile::tempdir().unwrap();
  let source = TcgCsvDataSource::new(&config_for(&server, dir.path())).unwrap();

  let err = source.fetch_groups().unwrap_err();
  assert!(matches!(err, AppError::Status { status: 404, .. }));
  missing.assert();
}
