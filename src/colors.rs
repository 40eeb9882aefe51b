use std::io::{self, IsTerminal};

const RESET: &str = "\x1b[0m";

/// ANSI color codes per report line kind
#[derive(Clone, Copy)]
pub struct Colors {
    pub created: &'static str,
    pub overwritten: &'static str,
    pub skipped: &'static str,
    pub failed: &'static str,
    pub banner: &'static str,
    enabled: bool,
}

impl Colors {
    pub fn new(enabled: bool) -> Self {
        if enabled {
            Self {
                created: "\x1b[32m",        // Green
                overwritten: "\x1b[34m",    // Blue
                skipped: "\x1b[31m",        // Red
                failed: "\x1b[1;31m",       // Bold red
                banner: "\x1b[41;37m",      // White on red
                enabled: true,
            }
        } else {
            Self {
                created: "",
                overwritten: "",
                skipped: "",
                failed: "",
                banner: "",
                enabled: false,
            }
        }
    }

    pub fn reset(&self) -> &'static str {
        if self.enabled {
            RESET
        } else {
            ""
        }
    }
}

pub fn should_use_colors(force_color: bool, no_color: bool) -> bool {
    // Priority: --no-color > --color > NO_COLOR env > TTY detection
    if no_color {
        return false;
    }
    if force_color {
        return true;
    }
    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }
    io::stdout().is_terminal()
}
