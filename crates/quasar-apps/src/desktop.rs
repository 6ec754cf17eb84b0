//! Freedesktop `.desktop` entry parsing.
//!
//! Only the `[Desktop Entry]` group is read, and only the keys a launcher
//! needs. Localized variants (`Name[de]=...`) are ignored.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

const DESKTOP_GROUP: &str = "Desktop Entry";

/// Errors from reading a desktop entry or its `Exec` line.
#[derive(Error, Debug)]
pub enum DesktopError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no [Desktop Entry] group")]
    MissingGroup,

    #[error("missing required key {0}")]
    MissingKey(&'static str),

    #[error("line {line}: expected `key=value` or `[group]`")]
    Malformed { line: usize },

    #[error("unterminated quote in command line")]
    UnterminatedQuote,

    #[error("command line is empty")]
    EmptyCommand,
}

/// An installed application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesktopEntry {
    /// Desktop id: the file name without `.desktop`
    pub id: String,

    /// Display name
    pub name: String,

    /// Raw `Exec` value, field codes included
    pub exec: String,

    /// Icon name or absolute path
    pub icon: Option<String>,

    /// Run inside a terminal emulator
    pub terminal: bool,

    /// Installed but not meant to be shown in menus
    pub no_display: bool,

    /// Treated as deleted
    pub hidden: bool,

    /// File the entry was read from
    pub path: PathBuf,
}

impl DesktopEntry {
    /// Read and parse a desktop file.
    pub fn load(path: &Path) -> Result<Self, DesktopError> {
        let contents = fs::read_to_string(path)?;
        let id = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default()
            .trim_end_matches(".desktop")
            .to_string();

        let mut entry = Self::parse(&id, &contents)?;
        entry.path = path.to_path_buf();
        Ok(entry)
    }

    /// Parse the contents of a desktop file.
    pub fn parse(id: &str, contents: &str) -> Result<Self, DesktopError> {
        let mut seen_group = false;
        let mut in_group = false;
        let mut name = None;
        let mut exec = None;
        let mut icon = None;
        let mut terminal = false;
        let mut no_display = false;
        let mut hidden = false;

        for (number, raw) in contents.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(group) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                in_group = group == DESKTOP_GROUP;
                seen_group |= in_group;
                continue;
            }

            let (key, value) = line
                .split_once('=')
                .ok_or(DesktopError::Malformed { line: number + 1 })?;
            if !in_group {
                continue;
            }

            let value = unescape(value.trim());
            match key.trim() {
                "Name" => name = Some(value),
                "Exec" => exec = Some(value),
                "Icon" if !value.is_empty() => icon = Some(value),
                "Terminal" => terminal = value == "true",
                "NoDisplay" => no_display = value == "true",
                "Hidden" => hidden = value == "true",
                _ => {}
            }
        }

        if !seen_group {
            return Err(DesktopError::MissingGroup);
        }

        Ok(DesktopEntry {
            id: id.to_string(),
            name: name.ok_or(DesktopError::MissingKey("Name"))?,
            exec: exec.ok_or(DesktopError::MissingKey("Exec"))?,
            icon,
            terminal,
            no_display,
            hidden,
            path: PathBuf::new(),
        })
    }

    /// Whether the entry should be offered as a result.
    pub fn is_visible(&self) -> bool {
        !self.no_display && !self.hidden
    }

    /// Build the argument vector to launch this entry.
    ///
    /// Field codes are dropped since no files or URLs are passed. Entries
    /// with `Terminal=true` are wrapped in `terminal`.
    pub fn command(&self, terminal: &str) -> Result<Vec<String>, DesktopError> {
        let mut argv = Vec::new();
        if self.terminal {
            argv.extend(split_command(terminal)?);
        }

        for arg in split_command(&self.exec)? {
            if let Some(arg) = expand_field_codes(&arg) {
                argv.push(arg);
            }
        }

        if argv.is_empty() {
            return Err(DesktopError::EmptyCommand);
        }
        Ok(argv)
    }
}

/// Undo the value escapes of the key file format.
fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('s') => out.push(' '),
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => {
                // `\\`, `\;` and the Exec-level escapes are kept for the
                // command-line splitter
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Split an `Exec` value into arguments.
///
/// Double-quoted arguments may contain spaces; inside them a backslash
/// escapes the next character. Single quotes are accepted too.
pub fn split_command(line: &str) -> Result<Vec<String>, DesktopError> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut has_current = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                has_current = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(escaped) => current.push(escaped),
                            None => return Err(DesktopError::UnterminatedQuote),
                        },
                        Some(other) => current.push(other),
                        None => return Err(DesktopError::UnterminatedQuote),
                    }
                }
            }
            '\'' => {
                has_current = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(other) => current.push(other),
                        None => return Err(DesktopError::UnterminatedQuote),
                    }
                }
            }
            '\\' => {
                has_current = true;
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            c if c.is_whitespace() => {
                if has_current {
                    args.push(std::mem::take(&mut current));
                    has_current = false;
                }
            }
            c => {
                has_current = true;
                current.push(c);
            }
        }
    }

    if has_current {
        args.push(current);
    }
    Ok(args)
}

/// Remove field codes from one argument; `%%` becomes `%`.
///
/// Returns `None` when the argument consisted only of field codes.
pub fn expand_field_codes(arg: &str) -> Option<String> {
    if !arg.contains('%') {
        return Some(arg.to_string());
    }

    let mut out = String::with_capacity(arg.len());
    let mut chars = arg.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('%') => out.push('%'),
            // %f %F %u %U %i %c %k and the deprecated codes carry nothing
            // when launching without files
            Some(_) | None => {}
        }
    }

    (!out.is_empty()).then_some(out)
}
