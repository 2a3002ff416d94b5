//! Drives the aggregation engine from newline-delimited JSON input.

use hopstats_core::{
    group_trace, HopStat, HopStatsError, HopStatsResult, ProbeRecord, SchedulerConfig, Session,
    Snapshot,
};
use serde::Serialize;
use std::path::Path;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tracing::{debug, info, warn};

type Input = Box<dyn AsyncBufRead + Unpin + Send>;

async fn open_input(path: Option<&Path>) -> HopStatsResult<Input> {
    match path {
        Some(path) => {
            let file = tokio::fs::File::open(path).await?;
            Ok(Box::new(BufReader::new(file)))
        }
        None => Ok(Box::new(BufReader::new(tokio::io::stdin()))),
    }
}

/// Decodes one input line. Blank lines yield `None`.
fn decode_line(line: &str) -> HopStatsResult<Option<ProbeRecord>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    ProbeRecord::from_json(line).map(Some)
}

/// Decodes a whole document: either a JSON array of records or one record per line.
fn decode_document(text: &str) -> HopStatsResult<Vec<ProbeRecord>> {
    if text.trim_start().starts_with('[') {
        return Ok(serde_json::from_str(text)?);
    }
    let mut records = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        match decode_line(line) {
            Ok(Some(record)) => records.push(record),
            Ok(None) => {}
            Err(e) if e.is_skippable() => {
                warn!(line = lineno + 1, error = %e, "Skipping malformed record");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(records)
}

fn serialize_error(err: serde_json::Error) -> HopStatsError {
    HopStatsError::Internal(format!("Failed to serialize output: {}", err))
}

async fn print_snapshots(
    mut rx: UnboundedReceiver<Snapshot>,
    pretty: bool,
) -> HopStatsResult<u64> {
    let mut stdout = tokio::io::stdout();
    let mut printed = 0;
    while let Some(snapshot) = rx.recv().await {
        let json = if pretty {
            snapshot.to_json()
        } else {
            snapshot.to_json_compact()
        }
        .map_err(serialize_error)?;
        stdout.write_all(json.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
        printed += 1;
    }
    Ok(printed)
}

/// Streams records into a live session until the input ends, then completes it.
pub async fn run_live(
    input: Option<&Path>,
    config: SchedulerConfig,
    pretty: bool,
) -> HopStatsResult<()> {
    let (tx, rx) = unbounded_channel();
    let session = Session::start(config, tx)?;
    let printer = tokio::spawn(print_snapshots(rx, pretty));

    let mut lines = open_input(input).await?.lines();
    let mut lineno = 0usize;
    let mut accepted = 0usize;
    let mut dropped = 0usize;
    while let Some(line) = lines.next_line().await? {
        lineno += 1;
        match decode_line(&line) {
            Ok(Some(record)) => {
                if session.ingest(&record) {
                    accepted += 1;
                } else {
                    dropped += 1;
                }
            }
            Ok(None) => {}
            Err(e) if e.is_skippable() => {
                dropped += 1;
                debug!(line = lineno, error = %e, "Skipping malformed record");
            }
            Err(e) => return Err(e),
        }
    }

    session.complete();
    info!(accepted, dropped, "Input finished");
    drop(session);

    let printed = printer
        .await
        .map_err(|e| HopStatsError::Internal(format!("Snapshot printer failed: {}", e)))??;
    debug!(printed, "Snapshot stream closed");
    Ok(())
}

#[derive(Debug, Serialize)]
struct HopSummary {
    hop: u32,
    groups: Vec<HopStat>,
}

/// Groups a finished trace and prints the result as JSON.
pub async fn run_group(input: Option<&Path>, summary: bool) -> HopStatsResult<()> {
    let mut text = String::new();
    open_input(input).await?.read_to_string(&mut text).await?;
    let records = decode_document(&text)?;
    info!(records = records.len(), "Grouping trace");

    let hops = group_trace(records);
    let json = if summary {
        let summaries: Vec<HopSummary> = hops
            .iter()
            .map(|hop| HopSummary {
                hop: hop.hop,
                groups: hop.groups.iter().map(|g| g.stats(hop.hop)).collect(),
            })
            .collect();
        serde_json::to_string_pretty(&summaries)
    } else {
        serde_json::to_string_pretty(&hops)
    }
    .map_err(serialize_error)?;

    let mut stdout = tokio::io::stdout();
    stdout.write_all(json.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(())
}
