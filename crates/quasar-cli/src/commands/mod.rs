//! CLI command implementations.

pub mod interactive;
pub mod query;

use quasar_core::{ListRow, Preview, ResultItem};
use serde::Serialize;

/// One printed result row.
#[derive(Debug, Serialize)]
pub struct RowOutput {
    pub rank: usize,
    pub provider: String,
    pub title: String,
    pub subtitle: String,
    pub icon: Option<String>,
    pub score: u64,
}

impl RowOutput {
    pub fn new(rank: usize, item: &ResultItem) -> Self {
        let (provider, row) = match item.provider() {
            Some(provider) => (provider.name().to_string(), provider.bind_list_item(item)),
            None => ("?".to_string(), ListRow::default()),
        };

        RowOutput {
            rank,
            provider,
            title: row.title,
            subtitle: row.subtitle,
            icon: row.icon,
            score: item.cached_score(),
        }
    }

    pub fn print(&self, selected: bool) {
        let marker = if selected { '>' } else { ' ' };
        println!(
            "{} {:>3}  {:<40} {}  [{}]",
            marker, self.rank, self.title, self.subtitle, self.provider
        );
    }
}

/// Print a preview below the result list.
pub fn print_preview(preview: &Preview) {
    match preview {
        Preview::Empty => {}
        Preview::Text { content, truncated } => {
            for line in content.lines().take(10) {
                println!("  | {}", line);
            }
            if *truncated {
                println!("  | ...");
            }
        }
        Preview::Image { path } => println!("  [image] {}", path.display()),
        Preview::Status {
            title, description, ..
        } => println!("  {} - {}", title, description),
        Preview::Error { message } => println!("  [error] {}", message),
    }
}
