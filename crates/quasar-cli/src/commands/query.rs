//! Query command - search once and print the ranked results.

use super::RowOutput;
use crate::app::App;
use crossbeam_channel::{after, never, select, unbounded, Receiver};
use quasar_core::{Config, LaunchRequest, SearchEvent, Status};
use std::time::{Duration, Instant};
use tracing::debug;

/// Run the query command.
pub fn run(
    config: Config,
    text: &str,
    limit: usize,
    json: bool,
    launch: bool,
    timeout_ms: Option<u64>,
) -> anyhow::Result<()> {
    if text.trim().is_empty() {
        anyhow::bail!("search text is empty");
    }

    let (events_tx, events_rx) = unbounded();
    let app = App::new(config, Some(events_tx))?;

    let start = Instant::now();
    app.searcher.set_text(text)?;

    let deadline = timeout_ms.map(Duration::from_millis);
    if !wait_for_completion(&events_rx, deadline) {
        debug!("Timed out, stopping search");
        app.searcher.cancel();
    }
    app.searcher.wait()?;
    let elapsed = start.elapsed();

    let snapshot = app.searcher.snapshot();
    let rows: Vec<RowOutput> = snapshot
        .items
        .iter()
        .take(limit)
        .enumerate()
        .map(|(rank, item)| RowOutput::new(rank, item))
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        for row in &rows {
            row.print(snapshot.selected == Some(row.rank));
        }

        eprintln!();
        eprintln!(
            "Found {} results in {:.3}ms",
            snapshot.items.len(),
            elapsed.as_secs_f64() * 1000.0
        );
    }

    if launch {
        match app.searcher.launch()? {
            LaunchRequest::Started(task) => {
                task.join()??;
                if let Some(row) = rows.first() {
                    eprintln!("Launched {}", row.title);
                }
            }
            LaunchRequest::NothingSelected => eprintln!("Nothing to launch"),
            LaunchRequest::AlreadyRunning => eprintln!("A launch is already pending"),
        }
    }

    Ok(())
}

/// Block until the session reports a final status.
///
/// Returns false if `deadline` passed first.
fn wait_for_completion(events: &Receiver<SearchEvent>, deadline: Option<Duration>) -> bool {
    let timeout = deadline.map(after).unwrap_or_else(never);
    loop {
        select! {
            recv(events) -> event => match event {
                Ok(SearchEvent::Status(Status::Complete { .. } | Status::Stopped { .. })) => {
                    return true;
                }
                Ok(_) => {}
                Err(_) => return true,
            },
            recv(timeout) -> _ => return false,
        }
    }
}
