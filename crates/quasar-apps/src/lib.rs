//! # Quasar Applications Provider
//!
//! Offers the applications installed on a freedesktop system, read from the
//! `.desktop` entries under the XDG data directories and the flatpak export
//! directories.
//!
//! Entries are loaded once by a background task started from
//! `init_global`; queries issued before the load completes wait for it.

pub mod desktop;
pub mod provider;

pub use desktop::{DesktopEntry, DesktopError};
pub use provider::AppProvider;
