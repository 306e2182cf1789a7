use std::path::Path;
use std::process;

use anyhow::Result;

use ladle_core::db::Database;
use ladle_core::ingest::{IngestError, ingest_file};

use super::helpers::json_error;

pub(crate) fn cmd_ingest(db: &Database, path: &Path, json: bool) -> Result<()> {
    let summary = match ingest_file(db, path) {
        Ok(summary) => summary,
        Err(e) if matches!(
            e.downcast_ref::<IngestError>(),
            Some(IngestError::UnsupportedShape { .. })
        ) =>
        {
            if json {
                println!("{}", json_error(&format!("{e:#}")));
            } else {
                eprintln!("Error: {e:#}");
            }
            process::exit(2);
        }
        Err(e) => return Err(e),
    };

    let skipped = summary.records_seen - summary.inserted;
    if json {
        println!(
            "{}",
            serde_json::json!({
                "records_seen": summary.records_seen,
                "inserted": summary.inserted,
                "skipped": skipped,
            })
        );
    } else {
        println!("Inserted {} recipes", summary.inserted);
        if skipped > 0 {
            println!("Skipped {skipped} entries that were not JSON objects");
        }
    }

    Ok(())
}
