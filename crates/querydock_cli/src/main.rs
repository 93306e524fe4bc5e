//! Command-line view of a workspace database.
//!
//! Usage: `querydock_cli [DB_PATH] [SEARCH_TEXT]`. Without a path the database
//! comes from `QUERYDOCK_CONFIG` (JSON) or `QUERYDOCK_DB`. Prints the ordered
//! tree, then the search hits when search text is given.

use log::error;
use querydock_core::config::CoreConfig;
use querydock_core::db::open_db;
use querydock_core::search::{SearchHit, SearchRequest};
use querydock_core::service::mutation::MutationEngine;
use querydock_core::{init_logging, Gateway, SqliteGateway};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

const ENV_CONFIG_PATH: &str = "QUERYDOCK_CONFIG";

fn main() -> ExitCode {
    println!("querydock_core ping={}", querydock_core::ping());
    println!("querydock_core version={}", querydock_core::core_version());

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("event=cli_run module=cli status=error error={message}");
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), String> {
    let mut config = match std::env::var(ENV_CONFIG_PATH) {
        Ok(path) => CoreConfig::from_file(Path::new(&path)),
        Err(_) => Ok(CoreConfig::default()),
    }
    .and_then(CoreConfig::with_env)
    .map_err(|err| err.to_string())?;
    let mut args = std::env::args().skip(1);
    if let Some(db_path) = args.next() {
        config.db_path = PathBuf::from(db_path);
    }
    let search_text = args.collect::<Vec<_>>().join(" ");

    init_logging(&config.log_level, config.log_dir.as_deref()).map_err(|err| err.to_string())?;

    let conn = open_db(&config.db_path).map_err(|err| err.to_string())?;
    let gateway = SqliteGateway::try_new(&conn).map_err(|err| err.to_string())?;
    let mut engine = MutationEngine::new(gateway, config.allow_list());
    engine.load().map_err(|err| err.to_string())?;

    print_tree(&mut engine);

    if let Some(request) = SearchRequest::new(&search_text, Some(config.search_limit)) {
        let hits = engine.search(&request).map_err(|err| err.to_string())?;
        println!("search \"{}\" hits={} limit={}", request.text, hits.len(), request.limit);
        for hit in &hits {
            print_hit(hit);
        }
    }
    Ok(())
}

fn print_hit(hit: &SearchHit) {
    println!(
        "  * {} ({}) in {}",
        bracket_matches(&hit.query.title, &hit.title_matches),
        hit.query.id,
        hit.table_name
    );
    if !hit.sql_matches.is_empty() {
        println!("    {}", bracket_matches(&hit.query.sql_code, &hit.sql_matches));
    }
}

/// Wraps each matched range in `[...]`.
fn bracket_matches(text: &str, matches: &[std::ops::Range<usize>]) -> String {
    let mut out = String::with_capacity(text.len() + matches.len() * 2);
    let mut cursor = 0;
    for range in matches {
        let (Some(before), Some(found)) = (text.get(cursor..range.start), text.get(range.clone()))
        else {
            continue;
        };
        out.push_str(before);
        out.push('[');
        out.push_str(found);
        out.push(']');
        cursor = range.end;
    }
    out.push_str(text.get(cursor..).unwrap_or_default());
    out
}

fn print_tree<G: Gateway>(engine: &mut MutationEngine<G>) {
    let collection = engine.collection().clone();
    for folder in collection.folders() {
        println!("[{}] {} ({})", folder.order_index, folder.name, folder.id);
        for table in collection.tables_in(Some(&folder.id)) {
            print_table(engine, table.id.as_str(), &table.table_name, table.order_index, "  ");
        }
    }
    for table in collection.tables_in(None) {
        print_table(engine, table.id.as_str(), &table.table_name, table.order_index, "");
    }
}

fn print_table<G: Gateway>(
    engine: &mut MutationEngine<G>,
    table_id: &str,
    name: &str,
    order_index: i64,
    indent: &str,
) {
    println!("{indent}- [{order_index}] {name} ({table_id})");
    let table_id = table_id.into();
    if let Err(err) = engine.load_queries(&table_id) {
        eprintln!("{indent}  ! failed to load queries: {err}");
        return;
    }
    for query in engine.collection().queries_in(&table_id) {
        println!("{indent}    * [{}] {}", query.order_index, query.title);
    }
}
