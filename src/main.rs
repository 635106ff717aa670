use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use minidb::executor::ExecResult;
use minidb::{Error, Statement, Table};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "minidb", version = VERSION, about = "Tiny embedded SQL database.")]
struct Cli {
    /// Database file to open (created if absent).
    filename: PathBuf,
}

fn main() -> ExitCode {
    let file = OpenOptions::new()
        .append(true)
        .create(true)
        .open("minidb.log")
        .expect("Failed to open log file");

    tracing_subscriber::fmt()
        .with_writer(file)
        .with_ansi(false)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.exit();
        }
        Err(_) => {
            eprintln!("Must supply a database filename.");
            return ExitCode::from(1);
        }
    };

    let mut table = match Table::open(&cli.filename) {
        Ok(table) => table,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("minidb> ");
        let _ = io::stdout().flush();
        line.clear();
        if stdin.read_line(&mut line).unwrap_or(0) == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match dispatch(&mut table, input) {
            Dispatch::Exit => break,
            Dispatch::Continue => {}
            Dispatch::Fatal(e) => {
                eprintln!("Error: {e}");
                return ExitCode::FAILURE;
            }
        }
    }

    if let Err(e) = table.close() {
        eprintln!("Error: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

enum Dispatch {
    Exit,
    Continue,
    Fatal(Error),
}

/// Meta-commands and transaction verbs are case-insensitive; SQL verbs
/// are matched lowercase-only inside `Statement::prepare` (spec §9).
fn dispatch(table: &mut Table, input: &str) -> Dispatch {
    let lower = input.to_ascii_lowercase();
    match lower.as_str() {
        ".exit" => return Dispatch::Exit,
        ".btree" => {
            return print_or_fatal(table.print_tree());
        }
        ".constants" => {
            println!("{}", Table::print_constants());
            return Dispatch::Continue;
        }
        ".stats" | ".analyze" | "analyze" => {
            return match table.analyze() {
                Ok(stats) => {
                    println!("{stats:?}");
                    Dispatch::Continue
                }
                Err(e) => report(e),
            };
        }
        "begin" | "begin transaction" => {
            return match table.begin() {
                Ok(()) => Dispatch::Continue,
                Err(e) => report(e),
            };
        }
        "commit" => {
            return match table.commit() {
                Ok(()) => Dispatch::Continue,
                Err(e) => report(e),
            };
        }
        "rollback" => {
            return match table.rollback() {
                Ok(()) => Dispatch::Continue,
                Err(e) => report(e),
            };
        }
        _ => {}
    }

    if let Some(rest) = lower.strip_prefix('.') {
        println!("Unrecognized command '.{rest}'");
        return Dispatch::Continue;
    }

    match Statement::prepare(input) {
        Ok(statement) => match table.execute(&statement) {
            Ok(ExecResult::Inserted) => {
                println!("Executed.");
                Dispatch::Continue
            }
            Ok(ExecResult::Affected(n)) => {
                println!("Executed ({n} row(s)).");
                Dispatch::Continue
            }
            Ok(ExecResult::Rows(rows)) => {
                for row in rows {
                    println!("({}, {}, {})", row.id, row.username, row.email);
                }
                println!("Executed.");
                Dispatch::Continue
            }
            Err(e) => report(e),
        },
        Err(e) => report(e),
    }
}

fn print_or_fatal(result: Result<String, Error>) -> Dispatch {
    match result {
        Ok(tree) => {
            print!("{tree}");
            Dispatch::Continue
        }
        Err(e) => report(e),
    }
}

/// Recoverable errors are printed and the loop continues; fatal errors
/// (broken invariants, I/O failure) abort the process (spec §7).
fn report(e: Error) -> Dispatch {
    if e.is_fatal() {
        Dispatch::Fatal(e)
    } else {
        println!("Error: {e}");
        Dispatch::Continue
    }
}
