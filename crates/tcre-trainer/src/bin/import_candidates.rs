//! Loads candidates from a JSON-lines file into a SQLite candidate store.
//!
//! Each line is one candidate:
//! `{"id": 1, "words": [..], "entities": [{"type": .., "word_start": .., "word_end": .., "is_candidate": ..}], "label": 1.0}`

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tcre_core::{Candidate, CandidateClass, SqliteCandidateStore};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "import_candidates")]
#[command(about = "Import JSON-lines candidates into a SQLite candidate store")]
struct Args {
    /// Candidate type class (e.g. "inducing_cytokine")
    #[arg(long)]
    relation_class: String,

    /// JSON-lines input file
    #[arg(long)]
    input: PathBuf,

    /// SQLite database to create or extend
    #[arg(long, default_value = "candidates.db")]
    candidate_db: PathBuf,

    /// Skip malformed lines instead of failing
    #[arg(long)]
    skip_invalid: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let class = CandidateClass::from_relation_class(&args.relation_class)?;
    let reader = BufReader::new(
        File::open(&args.input).with_context(|| format!("opening {:?}", args.input))?,
    );

    let mut cands = Vec::new();
    let mut skipped = 0usize;
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Candidate>(&line) {
            Ok(cand) => cands.push(cand),
            Err(e) if args.skip_invalid => {
                warn!("Skipping line {}: {e}", lineno + 1);
                skipped += 1;
            }
            Err(e) => return Err(e).with_context(|| format!("parsing line {}", lineno + 1)),
        }
    }

    let mut store = SqliteCandidateStore::open(&args.candidate_db)
        .with_context(|| format!("opening candidate database {:?}", args.candidate_db))?;
    let inserted = store.insert_all(&class, &cands)?;
    info!(
        "Imported {inserted} candidates ({skipped} skipped); {} {} candidates in {:?}",
        store.count(&class)?,
        class.relation_class,
        args.candidate_db
    );
    Ok(())
}
