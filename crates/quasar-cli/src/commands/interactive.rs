//! Interactive command - a line-oriented type-ahead session.
//!
//! Every line read from stdin replaces the search text. Lines starting with
//! `:` are commands:
//!
//! - `:N` select row N
//! - `:up` / `:down` move the selection
//! - `:open` launch the selection
//! - `:stop` stop the running search
//! - `:q` quit

use super::{print_preview, RowOutput};
use crate::app::App;
use crossbeam_channel::{unbounded, Receiver};
use quasar_core::{task, Config, LaunchRequest, SearchEvent, Searcher, Status};
use std::io::{self, BufRead, Write};
use std::sync::{Arc, Weak};
use tracing::warn;

const SHOWN_ROWS: usize = 10;

/// A parsed input line.
#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Text(&'a str),
    Select(usize),
    Move(isize),
    Open,
    Stop,
    Quit,
    Unknown(&'a str),
}

fn parse_input(line: &str) -> Input<'_> {
    let Some(command) = line.strip_prefix(':') else {
        return Input::Text(line);
    };

    match command.trim() {
        "q" | "quit" => Input::Quit,
        "open" => Input::Open,
        "stop" => Input::Stop,
        "up" => Input::Move(-1),
        "down" => Input::Move(1),
        other => other.parse().map(Input::Select).unwrap_or(Input::Unknown(other)),
    }
}

/// Run the interactive command.
pub fn run(config: Config) -> anyhow::Result<()> {
    let (events_tx, events_rx) = unbounded();
    let app = Arc::new(App::new(config, Some(events_tx))?);

    let weak = Arc::downgrade(&app);
    let _printer = task::spawn("events", move || print_events(events_rx, weak))?;

    eprintln!("Type to search; :N selects, :open launches, :q quits");
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let searcher = &app.searcher;

        match parse_input(&line) {
            Input::Text(text) => {
                searcher.set_text(text)?;
            }
            Input::Select(index) => {
                if !searcher.select_index(index, true) {
                    eprintln!("No row {}", index);
                }
            }
            Input::Move(delta) => {
                searcher.move_selection(delta);
            }
            Input::Open => match searcher.launch()? {
                LaunchRequest::Started(_) => {}
                LaunchRequest::AlreadyRunning => eprintln!("A launch is already pending"),
                LaunchRequest::NothingSelected => eprintln!("Nothing selected"),
            },
            Input::Stop => searcher.cancel(),
            Input::Quit => break,
            Input::Unknown(command) => eprintln!("Unknown command :{}", command),
        }
    }

    Ok(())
}

/// Print session events until the searcher goes away.
fn print_events(events: Receiver<SearchEvent>, app: Weak<App>) {
    for event in events {
        let Some(app) = app.upgrade() else {
            return;
        };

        match event {
            SearchEvent::Status(Status::Complete { results }) => {
                print_rows(&app.searcher);
                eprintln!("-- {} results", results);
            }
            SearchEvent::Status(Status::Stopped { results }) => {
                print_rows(&app.searcher);
                eprintln!("-- stopped with {} results", results);
            }
            SearchEvent::Preview { preview, .. } => print_preview(&preview),
            SearchEvent::Launched { title } => eprintln!("Launched {}", title),
            SearchEvent::LaunchFailed { message } => eprintln!("Launch failed: {}", message),
            SearchEvent::Status(_) | SearchEvent::ResultsChanged { .. } => {}
        }

        if let Err(e) = io::stdout().flush() {
            warn!(error = %e, "Failed to flush stdout");
        }
    }
}

fn print_rows(searcher: &Searcher) {
    let snapshot = searcher.snapshot();
    for (rank, item) in snapshot.items.iter().take(SHOWN_ROWS).enumerate() {
        RowOutput::new(rank, item).print(snapshot.selected == Some(rank));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_input() {
        assert_eq!(parse_input("firefox"), Input::Text("firefox"));
        assert_eq!(parse_input(""), Input::Text(""));
        assert_eq!(parse_input(":3"), Input::Select(3));
        assert_eq!(parse_input(":open"), Input::Open);
        assert_eq!(parse_input(":q"), Input::Quit);
        assert_eq!(parse_input(":down"), Input::Move(1));
        assert_eq!(parse_input(":stop"), Input::Stop);
        assert_eq!(parse_input(":bogus"), Input::Unknown("bogus"));
    }
}
