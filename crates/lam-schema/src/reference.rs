//! Steam Workshop references.
//!
//! Users paste identifiers in whatever form the Steam client hands them out:
//! a bare number, a community URL, or a `steam://` deep link. All of them
//! normalize to a [`WorkshopId`].

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Canonical page for a Workshop item or collection.
const FILEDETAILS_URL: &str = "https://steamcommunity.com/sharedfiles/filedetails/?id=";

static URL_FORM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?i:https?://)?(?i:www\.)?(?i:steamcommunity\.com)/(?:sharedfiles|workshop)/filedetails/?\?(?:[^#]*&)?id=(\d+)(?:[&#].*)?$",
    )
    .unwrap_or_else(|e| unreachable!("static regex: {e}"))
});

static DEEP_LINK_FORM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^steam://url/CommunityFilePage/(\d+)/?$")
        .unwrap_or_else(|e| unreachable!("static regex: {e}"))
});

/// Errors produced while parsing a user-supplied reference.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ReferenceError {
    /// The input could not be interpreted as a Workshop identifier.
    #[error("malformed workshop reference '{input}': {reason}")]
    Malformed {
        /// The raw input, trimmed.
        input: String,
        /// Why it was rejected.
        reason: &'static str,
    },
}

/// Numeric identifier of a Workshop item or collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkshopId(u64);

impl WorkshopId {
    /// Wraps a raw identifier.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw numeric value.
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Canonical community page URL. Parsing it yields the same id.
    pub fn url(self) -> String {
        format!("{FILEDETAILS_URL}{}", self.0)
    }
}

impl fmt::Display for WorkshopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for WorkshopId {
    type Err = ReferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        let malformed = |reason| ReferenceError::Malformed {
            input: input.to_string(),
            reason,
        };

        if input.is_empty() {
            return Err(malformed("empty reference"));
        }

        let digits = if input.bytes().all(|b| b.is_ascii_digit()) {
            input
        } else if let Some(caps) = URL_FORM
            .captures(input)
            .or_else(|| DEEP_LINK_FORM.captures(input))
        {
            caps.get(1).map_or("", |m| m.as_str())
        } else {
            return Err(malformed("expected a numeric id or a workshop URL"));
        };

        let raw: u64 = digits
            .parse()
            .map_err(|_| malformed("identifier out of range"))?;
        if raw == 0 {
            return Err(malformed("identifier must be non-zero"));
        }
        Ok(Self(raw))
    }
}
