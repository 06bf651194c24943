//! # CLI - thumbnail cache shell
//!
//! A REPL over an [`engine::Session`]. Reads commands from stdin, prints
//! results to stdout and logs to stderr, so it works both interactively and
//! with commands piped in.
//!
//! ## Commands
//!
//! ```text
//! OPEN path...            Open container files or directories
//! LIST                    Print every visible record
//! VERIFY [id...]          Verify checksums (all records when no ids given)
//! INDEX                   Build the hash index
//! RESOLVE hash path       Rename every record with this hash to path
//! LOOKUP hash             Print the record ids indexed under hash
//! REMOVE id...            Drop records from the session
//! RENAME id name          Change a record's display name
//! HIDE-BLANK on|off       Hide or show zero-length records
//! BG OPEN|VERIFY ...      Run OPEN or VERIFY on a background worker
//! WAIT [secs]             Wait for the background worker
//! CANCEL                  Cancel the background worker
//! STATS                   Print session counters
//! EXIT / QUIT             Shut down
//! ```
//!
//! Ids are printed as `#n`; both `#n` and `n` are accepted. Hashes are hex.
//!
//! ## Configuration
//!
//! ```text
//! THUMBDB_HIDE_BLANK     hide zero-length records on open  (default: "false")
//! THUMBDB_AUTO_VERIFY    verify records after opening      (default: "false")
//! THUMBDB_AUTO_INDEX     build the hash index after open   (default: "true")
//! THUMBDB_SHUTDOWN_SECS  bounded wait for worker teardown  (default: 5)
//! THUMBDB_LOG            log filter when RUST_LOG is unset (default: "warn")
//! ```
//!
//! ## Example
//!
//! ```text
//! $ cargo run -p cli
//! thumbdb started (hide_blank=false, auto_index=true, auto_verify=false)
//! > OPEN C:\Users\me\AppData\Local\Microsoft\Windows\Explorer
//! OK files=9 records=412 hidden=0 resyncs=1 sentinels=3 failures=1
//! ERR ...\thumbcache_idx.db: reading ...: not a cache container
//! OK indexed inserted=405 linked=7 skipped=0
//! > VERIFY
//! OK verified checked=412 skipped=0 header_mismatches=0 payload_mismatches=2 failed=0
//! > EXIT
//! bye
//! ```

mod render;

use anyhow::Result;
use config::{env_or, Config};
use engine::{Selection, Session, Worker};
use std::io::{self, BufRead, Write};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use render::{parse_hash, parse_id, parse_switch};

fn init_logging(cfg: &Config) {
    let filter = EnvFilter::try_new(env_or("RUST_LOG", &cfg.log_filter))
        .unwrap_or_else(|_| EnvFilter::new(config::DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Runs one of the long commands and renders its result.
fn run_long(session: &Session, cmd: &str, args: &[String]) -> String {
    match cmd {
        "OPEN" => {
            if args.is_empty() {
                return "ERR usage: OPEN path...".to_string();
            }
            render::batch_summary(&session.open_paths(args))
        }
        "VERIFY" => {
            let selection = if args.is_empty() || args[0].eq_ignore_ascii_case("all") {
                Selection::All
            } else {
                match args.iter().map(|a| parse_id(a)).collect::<Option<Vec<_>>>() {
                    Some(ids) => Selection::Ids(ids),
                    None => return "ERR usage: VERIFY [id...]".to_string(),
                }
            };
            render::verify_summary(&session.verify(selection))
        }
        other => format!("ERR cannot run {} in the background", other),
    }
}

fn main() -> Result<()> {
    let cfg = Config::from_env();
    init_logging(&cfg);
    tracing::debug!(config = ?cfg, "configuration loaded");

    println!(
        "thumbdb started (hide_blank={}, auto_index={}, auto_verify={})",
        cfg.hide_blank, cfg.auto_index, cfg.auto_verify
    );
    println!("Commands: OPEN path... | LIST | VERIFY [id...] | INDEX | RESOLVE hash path");
    println!("          LOOKUP hash | REMOVE id... | RENAME id name | HIDE-BLANK on|off");
    println!("          BG OPEN|VERIFY ... | WAIT [secs] | CANCEL | STATS | EXIT");
    print!("> ");
    io::stdout().flush().ok();

    let session = Session::new(cfg);
    let mut pending: Option<Worker<String>> = None;
    let stdin = io::stdin();

    for line in stdin.lock().lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        if let Some(cmd) = parts.next() {
            let cmd = cmd.to_uppercase();
            let args: Vec<String> = parts.map(str::to_string).collect();
            match cmd.as_str() {
                "OPEN" | "VERIFY" => println!("{}", run_long(&session, &cmd, &args)),
                "LIST" => {
                    let records = session.records();
                    if records.is_empty() {
                        println!("(empty)");
                    } else {
                        for (id, rec) in &records {
                            println!("{}", render::record_line(*id, rec));
                        }
                        println!("({} records)", records.len());
                    }
                }
                "INDEX" => println!("{}", render::index_summary(&session.build_index())),
                "RESOLVE" => match (args.first().and_then(|h| parse_hash(h)), args.len() >= 2) {
                    (Some(hash), true) => {
                        let path = args[1..].join(" ");
                        println!("OK {} renamed", session.resolve(hash, &path));
                    }
                    _ => println!("ERR usage: RESOLVE hash path"),
                },
                "LOOKUP" => match args.first().and_then(|h| parse_hash(h)) {
                    Some(hash) => {
                        let ids = session.lookup(hash);
                        if ids.is_empty() {
                            println!("(none)");
                        } else {
                            let ids: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
                            println!("{}", ids.join(" "));
                        }
                    }
                    None => println!("ERR usage: LOOKUP hash"),
                },
                "REMOVE" => match args.iter().map(|a| parse_id(a)).collect::<Option<Vec<_>>>() {
                    Some(ids) if !ids.is_empty() => println!("OK {} removed", session.remove(&ids)),
                    _ => println!("ERR usage: REMOVE id..."),
                },
                "RENAME" => match (args.first().and_then(|a| parse_id(a)), args.len() >= 2) {
                    (Some(id), true) => match session.rename(id, &args[1..].join(" ")) {
                        Ok(()) => println!("OK"),
                        Err(e) => println!("ERR rename failed: {}", e),
                    },
                    _ => println!("ERR usage: RENAME id name"),
                },
                "HIDE-BLANK" => match args.first().and_then(|a| parse_switch(a)) {
                    Some(hide) => println!("OK {} moved", session.set_hide_blank(hide)),
                    None => println!("ERR usage: HIDE-BLANK on|off"),
                },
                "BG" => {
                    if pending.as_ref().map_or(false, |w| !w.is_finished()) {
                        println!("ERR a background operation is already running");
                    } else if let Some((sub, rest)) = args.split_first() {
                        let sub = sub.to_uppercase();
                        let rest = rest.to_vec();
                        match session.spawn(&sub.to_lowercase(), move |s| run_long(s, &sub, &rest)) {
                            Ok(w) => {
                                println!("OK started {}", w.name());
                                pending = Some(w);
                            }
                            Err(e) => println!("ERR {:#}", e),
                        }
                    } else {
                        println!("ERR usage: BG OPEN|VERIFY ...");
                    }
                }
                "WAIT" => match pending.as_mut() {
                    None => println!("(no background operation)"),
                    Some(w) => {
                        let secs = args.first().and_then(|a| a.parse().ok()).unwrap_or(60);
                        match w.wait(Duration::from_secs(secs)) {
                            Ok(Some(out)) => {
                                println!("{}", out);
                                pending = None;
                            }
                            Ok(None) => println!("(still running)"),
                            Err(e) => {
                                println!("ERR {:#}", e);
                                pending = None;
                            }
                        }
                    }
                },
                "CANCEL" => match pending.take() {
                    None => println!("(no background operation)"),
                    Some(w) => match session.shutdown_default(w) {
                        Some(out) => println!("{}", out),
                        None => println!("ERR worker did not stop"),
                    },
                },
                "STATS" => println!("{:?}", session),
                "EXIT" | "QUIT" => {
                    break;
                }
                other => println!("unknown command: {}", other),
            }
        }

        print!("> ");
        io::stdout().flush().ok();
    }

    if let Some(w) = pending.take() {
        if let Some(out) = session.shutdown_default(w) {
            println!("{}", out);
        }
    }
    println!("bye");
    Ok(())
}
