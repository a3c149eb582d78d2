//! Nightly maintenance runner. Closes sessions left open on previous days,
//! truncates anything past the daily cap, and optionally runs the
//! duplicate-student merge or a full re-cap of the session table.
//!
//! Usage: gym-maintenance [--merge-duplicates] [--cap-all] [DB_PATH]
//! The database path may also come from the GYMLOG_DB environment variable;
//! it defaults to gymlog.sqlite3 in the working directory.

use std::path::PathBuf;
use std::process::ExitCode;

use log::{error, info};

use gymlog_core::Database;

struct Args {
    db_path: PathBuf,
    merge_duplicates: bool,
    cap_all: bool,
}

fn parse_args() -> Result<Args, String> {
    let mut db_path: Option<PathBuf> = None;
    let mut merge_duplicates = false;
    let mut cap_all = false;

    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--merge-duplicates" => merge_duplicates = true,
            "--cap-all" => cap_all = true,
            flag if flag.starts_with("--") => {
                return Err(format!("unknown flag: {flag}"));
            }
            path => {
                if db_path.is_some() {
                    return Err("only one database path may be given".into());
                }
                db_path = Some(PathBuf::from(path));
            }
        }
    }

    let db_path = db_path
        .or_else(|| std::env::var_os("GYMLOG_DB").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("gymlog.sqlite3"));

    Ok(Args {
        db_path,
        merge_duplicates,
        cap_all,
    })
}

async fn run(args: Args) -> anyhow::Result<()> {
    let db = Database::new(args.db_path)?;

    if let Some(last) = db.last_maintenance_run().await? {
        info!("Last maintenance run was at {last}");
    }

    let report = db.run_maintenance().await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if args.cap_all {
        let cap_report = db.cap_all_sessions(None).await?;
        info!(
            "Full cap pass: {} sessions examined, {} capped, {} repaired",
            cap_report.sessions_examined, cap_report.sessions_capped, cap_report.sessions_repaired
        );
        println!("{}", serde_json::to_string_pretty(&cap_report)?);
    }

    if args.merge_duplicates {
        let merged = db.merge_duplicate_students().await?;
        info!("Merged {merged} duplicate student record(s)");
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{message}");
            eprintln!("usage: gym-maintenance [--merge-duplicates] [--cap-all] [DB_PATH]");
            return ExitCode::from(2);
        }
    };

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("Maintenance failed: {err:#}");
            ExitCode::FAILURE
        }
    }
}
