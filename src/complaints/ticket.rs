//! Ticket numbers: `{PREFIX}-{YYYY}-{NNNNN}`, sequence per year.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::ComplaintError;

static TICKET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Z]+)-(\d{4})-(\d{5,})$").expect("ticket regex is valid")
});

/// A parsed ticket number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketNumber {
    pub prefix: String,
    pub year: i32,
    pub sequence: u64,
}

impl TicketNumber {
    pub fn new(prefix: impl Into<String>, year: i32, sequence: u64) -> Self {
        Self {
            prefix: prefix.into(),
            year,
            sequence,
        }
    }
}

impl fmt::Display for TicketNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:04}-{:05}", self.prefix, self.year, self.sequence)
    }
}

impl FromStr for TicketNumber {
    type Err = ComplaintError;

    /// Case-insensitive. Only the canonical padding is accepted, so each
    /// ticket has exactly one spelling.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || ComplaintError::MalformedTicket(s.to_string());
        let normalized = s.trim().to_ascii_uppercase();
        let caps = TICKET_RE.captures(&normalized).ok_or_else(malformed)?;

        let ticket = Self {
            prefix: caps[1].to_string(),
            year: caps[2].parse().map_err(|_| malformed())?,
            sequence: caps[3].parse().map_err(|_| malformed())?,
        };
        if ticket.to_string() != normalized {
            return Err(malformed());
        }
        Ok(ticket)
    }
}
