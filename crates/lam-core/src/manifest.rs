//! Line-preserving model of the engine's `gameinfo.txt`.
//!
//! The file is KeyValues text. Only enough of it is understood to validate
//! brace structure and locate the `SearchPaths` block; every line that does
//! not carry the managed marker is reproduced byte for byte.

use lam_schema::{AddonId, MANAGED_MARKER};
use thiserror::Error;

/// Why `gameinfo.txt` could not be understood.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ManifestError {
    #[error("not valid UTF-8")]
    Encoding,

    #[error("line {line}: {reason}")]
    Syntax { line: usize, reason: &'static str },

    #[error("no SearchPaths block")]
    MissingSearchPaths,
}

/// An addon-owned search path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedEntry {
    pub id: AddonId,
    /// Engine-relative archive path, `/`-separated.
    pub path: String,
}

/// Renders one managed line without its terminator.
pub fn format_entry(indent: &str, entry: &ManagedEntry) -> String {
    format!(
        "{indent}Game\t\"{}\"\t{MANAGED_MARKER} {}",
        entry.path, entry.id
    )
}

#[derive(Debug, Clone)]
struct Line {
    text: String,
    ending: &'static str,
    /// Set on lines carrying the managed marker.
    owned: Option<Option<AddonId>>,
    /// Key/value line directly inside SearchPaths.
    entry: bool,
}

impl Line {
    fn indent(&self) -> &str {
        let body = self.text.trim_start_matches('\u{feff}');
        let end = body.len() - body.trim_start().len();
        &body[..end]
    }
}

/// A parsed manifest that can be re-rendered with new managed entries.
#[derive(Debug, Clone)]
pub struct Manifest {
    lines: Vec<Line>,
    close: usize,
    newline: &'static str,
}

enum Token {
    Word(String),
    Open,
    Close,
}

#[derive(Clone, Copy)]
enum Phase {
    Seeking,
    Named,
    Inside(usize),
    Done,
}

impl Manifest {
    /// Parses and validates the manifest bytes.
    ///
    /// A SearchPaths entry on the same line as the block's opening brace is
    /// a syntax error, since the managed block could not be placed above it.
    pub fn parse(bytes: &[u8]) -> Result<Self, ManifestError> {
        let text = std::str::from_utf8(bytes).map_err(|_| ManifestError::Encoding)?;

        let mut lines = Vec::new();
        for raw in text.split_inclusive('\n') {
            let (body, ending) = if let Some(b) = raw.strip_suffix("\r\n") {
                (b, "\r\n")
            } else if let Some(b) = raw.strip_suffix('\n') {
                (b, "\n")
            } else {
                (raw, "")
            };
            lines.push(Line {
                text: body.to_string(),
                ending,
                owned: None,
                entry: false,
            });
        }

        let mut depth = 0usize;
        let mut phase = Phase::Seeking;
        let mut open = None;
        let mut close = None;

        for (i, line) in lines.iter_mut().enumerate() {
            let (tokens, comment) = tokenize(&line.text, i + 1)?;
            if let Some(rest) = comment.and_then(|c| c.strip_prefix(MANAGED_MARKER))
                && tokens.iter().all(|t| matches!(t, Token::Word(_)))
            {
                line.owned = Some(rest.trim().parse::<AddonId>().ok());
                continue;
            }

            let mut first_word = true;
            for token in tokens {
                match token {
                    Token::Word(word) => {
                        if first_word
                            && let Phase::Inside(base) = phase
                            && depth == base + 1
                        {
                            // The managed block must open after the brace line.
                            if open == Some(i) {
                                return Err(ManifestError::Syntax {
                                    line: i + 1,
                                    reason: "SearchPaths entry shares a line with '{'",
                                });
                            }
                            line.entry = true;
                        }
                        first_word = false;
                        phase = match phase {
                            Phase::Seeking if word.eq_ignore_ascii_case("SearchPaths") => {
                                Phase::Named
                            }
                            Phase::Named => Phase::Seeking,
                            other => other,
                        };
                    }
                    Token::Open => {
                        if let Phase::Named = phase {
                            phase = Phase::Inside(depth);
                            open = Some(i);
                        }
                        depth += 1;
                    }
                    Token::Close => {
                        if depth == 0 {
                            return Err(ManifestError::Syntax {
                                line: i + 1,
                                reason: "unbalanced '}'",
                            });
                        }
                        depth -= 1;
                        if let Phase::Inside(base) = phase
                            && depth == base
                        {
                            phase = Phase::Done;
                            close = Some(i);
                        }
                    }
                }
            }
        }

        if depth != 0 {
            return Err(ManifestError::Syntax {
                line: lines.len(),
                reason: "unclosed '{'",
            });
        }
        let (Some(open), Some(close)) = (open, close) else {
            return Err(ManifestError::MissingSearchPaths);
        };
        if open == close {
            return Err(ManifestError::Syntax {
                line: open + 1,
                reason: "SearchPaths block must span more than one line",
            });
        }

        let newline = lines
            .iter()
            .map(|l| l.ending)
            .find(|e| !e.is_empty())
            .unwrap_or("\n");
        Ok(Self {
            lines,
            close,
            newline,
        })
    }

    /// Ids named by managed lines currently in the file.
    pub fn managed_ids(&self) -> Vec<AddonId> {
        self.lines
            .iter()
            .filter_map(|l| l.owned.clone().flatten())
            .collect()
    }

    /// Whether any line carries the managed marker, owned id or not.
    pub fn has_managed_lines(&self) -> bool {
        self.lines.iter().any(|l| l.owned.is_some())
    }

    /// Foreign SearchPaths entries, trimmed, in file order.
    pub fn foreign_entries(&self) -> Vec<&str> {
        self.lines
            .iter()
            .filter(|l| l.entry)
            .map(|l| l.text.trim())
            .collect()
    }

    /// The file with every managed line replaced by `entries`.
    ///
    /// The managed block goes immediately before the first foreign
    /// SearchPaths entry, or before the closing brace of an otherwise empty
    /// block, and copies that line's indentation and line ending.
    pub fn render(&self, entries: &[ManagedEntry]) -> Vec<u8> {
        let anchor = self
            .lines
            .iter()
            .position(|l| l.entry)
            .unwrap_or(self.close);
        let anchor_line = &self.lines[anchor];
        let indent = if anchor_line.entry {
            anchor_line.indent().to_string()
        } else {
            format!("{}\t", anchor_line.indent())
        };
        let ending = match anchor_line.ending {
            "" => self.newline,
            e => e,
        };

        let mut out = String::new();
        for (i, line) in self.lines.iter().enumerate() {
            if line.owned.is_some() {
                continue;
            }
            if i == anchor {
                for entry in entries {
                    out.push_str(&format_entry(&indent, entry));
                    out.push_str(ending);
                }
            }
            out.push_str(&line.text);
            out.push_str(line.ending);
        }
        out.into_bytes()
    }
}

fn tokenize(text: &str, line: usize) -> Result<(Vec<Token>, Option<&str>), ManifestError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut tokens = Vec::new();
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => {
                let rest = &text[i + 1..];
                let Some(end) = rest.find('"') else {
                    return Err(ManifestError::Syntax {
                        line,
                        reason: "unterminated quote",
                    });
                };
                tokens.push(Token::Word(rest[..end].to_string()));
                i += end + 2;
            }
            b'{' => {
                tokens.push(Token::Open);
                i += 1;
            }
            b'}' => {
                tokens.push(Token::Close);
                i += 1;
            }
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                return Ok((tokens, Some(&text[i..])));
            }
            b if b.is_ascii_whitespace() => i += 1,
            _ => {
                let ch = text[i..].chars().next().unwrap_or(' ');
                if ch.is_whitespace() {
                    i += ch.len_utf8();
                    continue;
                }
                let end = text[i..]
                    .find(|c: char| c.is_whitespace() || matches!(c, '"' | '{' | '}'))
                    .map_or(text.len(), |n| i + n);
                tokens.push(Token::Word(text[i..end].to_string()));
                i = end;
            }
        }
    }
    Ok((tokens, None))
}
