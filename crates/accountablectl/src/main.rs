// Copyright (c) 2026 AccountabilityMe Contributors
// SPDX-License-Identifier: Apache-2.0

//! accountablectl
//!
//! Thin operator wrappers over the ledger core: chain verification,
//! projection rebuild, event export, bundle export/verification, genesis
//! editor creation, key generation and anchor sweeps.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use accountable_core::anchor::AnchorService;
use accountable_core::ledger::LedgerService;
use accountable_core::payloads::{EditorRole, RegisterEditor, SCHEMA_VERSION};
use accountable_core::scheduler::{AnchorConfig, AnchorScheduler};
use accountable_core::signing::Keypair;
use accountable_core::store::{ChainVerdict, EventStore};
use accountable_core::store_sqlite::SqliteEventStore;

#[derive(Debug, Parser)]
#[command(name = "accountablectl")]
#[command(about = "Operator tooling for the AccountabilityMe ledger")]
struct Cli {
    #[arg(long, default_value = "info")]
    log: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate an Ed25519 keypair, base64-encoded.
    Keygen,

    /// Register the first (genesis) editor in an empty ledger.
    CreateGenesisEditor {
        #[arg(long)]
        db: PathBuf,
        #[arg(long)]
        username: String,
        #[arg(long)]
        display_name: String,
        #[arg(long, default_value = "founding editor created by the operator")]
        rationale: String,
    },

    /// Re-derive every event hash and check chain linkage.
    VerifyChain {
        #[arg(long)]
        db: PathBuf,
    },

    /// Truncate the projection tables and replay from sequence 0.
    RebuildProjections {
        #[arg(long)]
        db: PathBuf,
    },

    /// Dump the full event log as newline-delimited JSON.
    ExportEvents {
        #[arg(long)]
        db: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Export the self-verifying bundle for one claim.
    ExportBundle {
        #[arg(long)]
        db: PathBuf,
        #[arg(long)]
        claim_id: Uuid,
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Verify a claim bundle offline. Exit code: 0 verified, 1 tampered,
    /// 2 incomplete, 3 invalid format.
    VerifyBundle {
        bundle: PathBuf,
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Sweep unanchored events into pending Merkle batches.
    Anchor {
        #[arg(long)]
        db: PathBuf,
        #[arg(long, default_value_t = 100)]
        batch_size: usize,
    },

    /// Print the Merkle inclusion proof for an anchored event.
    Prove {
        #[arg(long)]
        db: PathBuf,
        #[arg(long)]
        event_id: Uuid,
    },
}

fn open_ledger(db: &PathBuf) -> Result<(Arc<SqliteEventStore>, LedgerService), Box<dyn std::error::Error>> {
    let store = Arc::new(SqliteEventStore::open(db)?);
    let ledger = LedgerService::open(store.clone())?;
    Ok((store, ledger))
}

fn write_output(out: Option<PathBuf>, content: &str) -> Result<(), Box<dyn std::error::Error>> {
    match out {
        Some(path) => fs::write(path, content)?,
        None => println!("{content}"),
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(cli.log.clone()))
        .init();

    match cli.cmd {
        Command::Keygen => {
            let pair = Keypair::generate();
            println!("private_key: {}", pair.private_key);
            println!("public_key:  {}", pair.public_key);
            println!();
            println!("Store the private key offline. The ledger only ever records the public key.");
            Ok(())
        }

        Command::CreateGenesisEditor {
            db,
            username,
            display_name,
            rationale,
        } => {
            let (_, ledger) = open_ledger(&db)?;
            let keys = Keypair::generate();
            let editor_id = Uuid::new_v4();
            let receipt = ledger.register_editor(
                RegisterEditor {
                    editor_id,
                    username,
                    display_name,
                    role: EditorRole::Admin,
                    public_key: keys.public_key.clone(),
                    registered_by: None,
                    registration_rationale: rationale,
                    schema_version: SCHEMA_VERSION,
                },
                &keys.private_key,
            )?;
            println!("editor_id:   {editor_id}");
            println!("event_id:    {}", receipt.event_id);
            println!("sequence:    {}", receipt.sequence_number);
            println!("public_key:  {}", keys.public_key);
            println!("private_key: {}", keys.private_key);
            println!();
            println!("The private key is shown once and never stored. Keep it safe.");
            Ok(())
        }

        Command::VerifyChain { db } => {
            let (_store, ledger) = open_ledger(&db)?;
            match ledger.verify_chain() {
                Ok(ChainVerdict::Valid) => {
                    let status = ledger.integrity_status()?;
                    println!("chain OK: {} events", status.event_count);
                    if let Some(hash) = status.last_event_hash {
                        println!("tail hash: {hash}");
                    }
                    Ok(())
                }
                Ok(ChainVerdict::Cancelled) => Err("verification cancelled".into()),
                Ok(ChainVerdict::BrokenAt(sequence)) | Err(accountable_core::LedgerError::LedgerCorruption(sequence)) => {
                    eprintln!("chain BROKEN at sequence {sequence}");
                    std::process::exit(1);
                }
                Err(err) => Err(err.into()),
            }
        }

        Command::RebuildProjections { db } => {
            let (store, ledger) = open_ledger(&db)?;
            let state = ledger.with_projections(|p| p.clone());
            store.persist_projections(&state)?;
            println!(
                "projections rebuilt through sequence {}",
                state
                    .last_processed_sequence()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "<empty>".to_string())
            );
            Ok(())
        }

        Command::ExportEvents { db, out } => {
            let store = SqliteEventStore::open(&db)?;
            let events = store.list_all()?;
            let mut lines = String::new();
            for event in &events {
                lines.push_str(&serde_json::to_string(event)?);
                lines.push('\n');
            }
            write_output(out, &lines)?;
            eprintln!("exported {} events", events.len());
            Ok(())
        }

        Command::ExportBundle { db, claim_id, out } => {
            let (_, ledger) = open_ledger(&db)?;
            let bundle = ledger.export_bundle(claim_id)?;
            write_output(out, &bundle.to_json()?)?;
            Ok(())
        }

        Command::VerifyBundle { bundle, json } => {
            let raw = fs::read_to_string(&bundle)?;
            let parsed: serde_json::Value = match serde_json::from_str(&raw) {
                Ok(value) => value,
                Err(err) => {
                    eprintln!("invalid JSON: {err}");
                    std::process::exit(3);
                }
            };
            let report = accountable_verifier::verify_bundle(&parsed);
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("result:   {:?}", report.verdict);
                println!("claim_id: {}", report.claim_id);
                println!("events:   {}", report.event_count);
                for check in &report.checks_passed {
                    println!("  + {check}");
                }
                for check in &report.checks_failed {
                    println!("  - {check}");
                }
                for warning in &report.warnings {
                    println!("  ! {warning}");
                }
            }
            let code = match report.verdict {
                accountable_verifier::BundleVerdict::Verified => 0,
                accountable_verifier::BundleVerdict::Tampered => 1,
                accountable_verifier::BundleVerdict::Incomplete => 2,
                accountable_verifier::BundleVerdict::InvalidFormat => 3,
            };
            std::process::exit(code);
        }

        Command::Anchor { db, batch_size } => {
            let store = Arc::new(SqliteEventStore::open(&db)?);
            let anchors = AnchorService::restore(store.as_ref(), store.load_anchor_batches()?)?;
            let config = AnchorConfig {
                batch_size,
                ..AnchorConfig::from_env()
            };
            let created = AnchorScheduler::run_once(store.as_ref(), &anchors, &config)?;
            if created.is_empty() {
                println!("nothing to anchor");
            }
            for batch in &created {
                store.save_anchor_batch(batch)?;
                println!(
                    "batch {} [{}..{}] root {}",
                    batch.batch_id, batch.start_sequence, batch.end_sequence, batch.merkle_root
                );
            }
            Ok(())
        }

        Command::Prove { db, event_id } => {
            let store = Arc::new(SqliteEventStore::open(&db)?);
            let anchors = AnchorService::restore(store.as_ref(), store.load_anchor_batches()?)?;
            let proof = anchors.prove_event(event_id)?;
            println!("{}", serde_json::to_string_pretty(&proof)?);
            Ok(())
        }
    }
}
