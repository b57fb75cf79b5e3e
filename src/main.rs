//! Knowledge base server - command line interface
//!
//! This binary provides a small command-line front end over the query
//! facade for local inspection and smoke-testing: point lookup, text
//! search, proximity search, and type statistics. Routing, auth, and
//! rate limiting for a real network-facing server are out of scope here
//! and left to the external HTTP front-end this crate is a library for.
//!
//! # Commands
//!
//! - **`lookup <id>`** - Fetches an article by id
//! - **`title <title>`** - Fetches an article by title
//! - **`search <query>`** - BM25 full-text search over titles/text
//! - **`geo <lat> <lng> <radius_m>`** - Proximity search
//! - **`stats`** - Per-category article counts from the manifest
//!
//! # Exit codes
//!
//! - `0` - success
//! - `1` - bad arguments or configuration
//! - `2` - the query itself failed (not found, transport error, ...)

use std::env;
use std::process;
use std::sync::Arc;

use url::Url;
use wikikb::context::{RequestContext, SharedCaches};
use wikikb::query::{QueryFacade, TextSearchOptions};
use wikikb::Config;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    if args.len() == 2 && (args[1] == "--help" || args[1] == "-h") {
        print_help();
        return;
    }
    if args.len() < 2 {
        eprintln!("Error: no command given\n");
        print_help();
        process::exit(1);
    }

    let config = match Config::from_env() {
        Ok(config) => Arc::new(config),
        Err(err) => {
            eprintln!("Error: {err}");
            process::exit(1);
        }
    };

    let store_url = match Url::parse(&config.data_root) {
        Ok(url) => url,
        Err(err) => {
            eprintln!("Error: DATA_ROOT is not a valid URL: {err}");
            process::exit(1);
        }
    };
    let (store, _) = match object_store::parse_url(&store_url) {
        Ok(parsed) => parsed,
        Err(err) => {
            eprintln!("Error: failed to open DATA_ROOT: {err}");
            process::exit(1);
        }
    };

    let ctx = Arc::new(RequestContext::new(Arc::from(store), config, Arc::new(SharedCaches::new())));
    let facade = QueryFacade::new(ctx);

    let command = args[1].as_str();
    let result = match command {
        "lookup" if args.len() == 3 => facade.get_article_by_id(&args[2]).await.map(|a| print_json(&a)),
        "title" if args.len() == 3 => facade.get_article_by_title(&args[2]).await.map(|a| print_json(&a)),
        "search" if args.len() == 3 => {
            let options = TextSearchOptions { limit: 20, types: None, use_fts: true };
            facade.text_search(&args[2], &options).await.map(|r| print_json(&r.value))
        }
        "geo" if args.len() == 5 => {
            run_geo(&facade, &args[2], &args[3], &args[4]).await
        }
        "stats" if args.len() == 2 => facade.type_stats().await.map(|s| print_json(&s)),
        _ => {
            eprintln!("Error: unknown command or wrong argument count for '{command}'\n");
            print_help();
            process::exit(1);
        }
    };

    if let Err(err) = result {
        eprintln!("Error: {err}");
        process::exit(2);
    }
}

async fn run_geo(facade: &QueryFacade, lat: &str, lng: &str, radius: &str) -> wikikb::Result<()> {
    use wikikb::query::GeoSearchOptions;

    let lat: f64 = lat
        .parse()
        .map_err(|_| wikikb::KbError::invalid_argument("lat must be a number"))?;
    let lng: f64 = lng
        .parse()
        .map_err(|_| wikikb::KbError::invalid_argument("lng must be a number"))?;
    let radius: f64 = radius
        .parse()
        .map_err(|_| wikikb::KbError::invalid_argument("radius must be a number"))?;
    let options = GeoSearchOptions { limit: 20, fast: false };
    let result = facade.geo_search(lat, lng, radius, None, &options).await?;
    print_json(&result);
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(err) => eprintln!("Error: failed to serialize result: {err}"),
    }
}

fn print_help() {
    let program = env::args().next().unwrap_or_else(|| "wikikb".to_string());
    println!("Knowledge base query CLI");
    println!();
    println!("Usage:");
    println!("  {program} lookup <id>");
    println!("  {program} title <title>");
    println!("  {program} search <query>");
    println!("  {program} geo <lat> <lng> <radius_m>");
    println!("  {program} stats");
    println!("  {program} --help");
    println!();
    println!("Configuration is read from the environment: DATA_ROOT (required),");
    println!("INDEX_ROOT, API_KEYS, EMBED_ACCOUNT, EMBED_TOKEN, EMBED_MODEL,");
    println!("CACHE_BUDGET_BYTES.");
}
