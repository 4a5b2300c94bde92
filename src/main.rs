use anyhow::{Context, Result};
use cardscan_lib::setcode::PlainTextRecognizer;
use cardscan_lib::{AppConfig, AppState, SortType};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "cardscan", about = "Scan trading cards and track a collection")]
struct Cli {
  /// Enable debug logging (RUST_LOG still wins when set)
  #[arg(short = 'v', long, global = true)]
  verbose: bool,

  /// Config file (defaults to cardscan.toml in the data dir)
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  /// Data directory holding the database
  #[arg(long, global = true, env = "CARDSCAN_HOME")]
  data_dir: Option<PathBuf>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
  /// Populate the catalog cache (only when empty unless --force)
  Sync {
    #[arg(long)]
    force: bool,
  },
  /// Show catalog cache state
  Status,
  /// Drop the cached catalog (the collection is kept)
  ClearCache,
  /// Match recognised-text frames against the catalog
  Scan {
    /// Text or JSON files, one recognised frame each
    #[arg(required = true)]
    frames: Vec<PathBuf>,

    /// Add the reviewed cards to the collection
    #[arg(long)]
    commit: bool,
  },
  /// Look up one set code in the cache
  Lookup { set_code: String },
  /// Search cached cards by name or set
  Search {
    query: String,

    #[arg(long, value_enum, default_value_t = SortArg::None)]
    sort: SortArg,
  },
  /// Manage the personal collection
  Collection {
    #[command(subcommand)]
    action: CollectionAction,
  },
}

#[derive(Subcommand, Debug)]
enum CollectionAction {
  List {
    #[arg(long, default_value = "")]
    query: String,

    #[arg(long, value_enum, default_value_t = SortArg::None)]
    sort: SortArg,
  },
  Add { product_id: String },
  Remove { product_id: String },
  Clear,
  Summary,
  /// Copy current catalog prices onto owned cards
  Reprice,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SortArg {
  PriceLowToHigh,
  PriceHighToLow,
  CardNumberLowToHigh,
  CardNumberHighToLow,
  NameAToZ,
  NameZToA,
  RarityLowToHigh,
  RarityHighToLow,
  None,
}

impl From<SortArg> for SortType {
  fn from(value: SortArg) -> Self {
    match value {
      SortArg::PriceLowToHigh => SortType::PriceLowToHigh,
      SortArg::PriceHighToLow => SortType::PriceHighToLow,
      SortArg::CardNumberLowToHigh => SortType::CardNumberLowToHigh,
      SortArg::CardNumberHighToLow => SortType::CardNumberHighToLow,
      SortArg::NameAToZ => SortType::NameAToZ,
      SortArg::NameZToA => SortType::NameZToA,
      SortArg::RarityLowToHigh => SortType::RarityLowToHigh,
      SortArg::RarityHighToLow => SortType::RarityHighToLow,
      SortArg::None => SortType::None,
    }
  }
}

fn init_logging(verbose: bool) {
  let default_level = if verbose { "debug" } else { "info" };
  env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
    .format_timestamp_millis()
    .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

fn run(cli: Cli) -> Result<()> {
  let mut config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
  if let Some(data_dir) = cli.data_dir {
    config.data_dir = data_dir;
  }
  let state = AppState::initialize(config).context("Failed to initialize database")?;
  log::debug!("Using database {}", state.db_path.display());

  match cli.command {
    Commands::Sync { force } => {
      let source = state.catalog_source()?;
      print_json(&cardscan_lib::sync_catalog(&state, &source, force)?)
    }
    Commands::Status => print_json(&cardscan_lib::get_catalog_sync_state(&state)?),
    Commands::ClearCache => {
      cardscan_lib::clear_catalog_cache(&state)?;
      print_json(&cardscan_lib::get_catalog_sync_state(&state)?)
    }
    Commands::Scan { frames, commit } => {
      let source = state.catalog_source()?;
      let report = cardscan_lib::scan_frames(&state, &source, &PlainTextRecognizer, &frames, commit)?;
      print_json(&report)
    }
    Commands::Lookup { set_code } => print_json(&cardscan_lib::lookup_set_code(&state, &set_code)?),
    Commands::Search { query, sort } => {
      print_json(&cardscan_lib::search_catalog(&state, &query, sort.into())?)
    }
    Commands::Collection { action } => match action {
      CollectionAction::List { query, sort } => {
        print_json(&cardscan_lib::get_collection(&state, &query, sort.into())?)
      }
      CollectionAction::Add { product_id } => {
        let count = cardscan_lib::add_card_to_collection(&state, &product_id)?;
        print_json(&serde_json::json!({ "productId": product_id, "count": count }))
      }
      CollectionAction::Remove { product_id } => {
        let remaining = cardscan_lib::remove_card_from_collection(&state, &product_id)?;
        print_json(&serde_json::json!({ "productId": product_id, "count": remaining.unwrap_or(0) }))
      }
      CollectionAction::Clear => {
        let removed = cardscan_lib::clear_collection(&state)?;
        print_json(&serde_json::json!({ "removed": removed }))
      }
      CollectionAction::Summary => print_json(&cardscan_lib::get_collection_summary(&state)?),
      CollectionAction::Reprice => {
        let updated = cardscan_lib::reprice_collection(&state)?;
        print_json(&serde_json::json!({ "updated": updated }))
      }
    },
  }
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  init_logging(cli.verbose);

  match run(cli) {
    Ok(()) => ExitCode::SUCCESS,
    Err(error) => {
      log::error!("{:#}", error);
      ExitCode::FAILURE
    }
  }
}
