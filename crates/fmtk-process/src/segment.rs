//! Byte-stream segmentation.
//!
//! The target writes ordinary newline-terminated lines, but it can also emit
//! multi-line payloads wrapped in a private start/end bracket. A [`Segmenter`]
//! turns arbitrarily chunked reads into whole segments for both shapes.

/// A single rule for where one segment ends and the next begins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Matcher {
    /// Split on every occurrence of the byte sequence. The delimiter itself is
    /// dropped.
    Delimiter(Vec<u8>),
    /// Everything between `start` and `end` forms one segment, regardless of
    /// any delimiters it contains.
    Bracket { start: Vec<u8>, end: Vec<u8> },
}

impl Matcher {
    pub fn delimiter(bytes: impl Into<Vec<u8>>) -> Self {
        Self::Delimiter(bytes.into())
    }

    pub fn bracket(start: impl Into<Vec<u8>>, end: impl Into<Vec<u8>>) -> Self {
        Self::Bracket {
            start: start.into(),
            end: end.into(),
        }
    }

    /// The byte sequence that opens this matcher.
    fn lead(&self) -> &[u8] {
        match self {
            Self::Delimiter(bytes) => bytes,
            Self::Bracket { start, .. } => start,
        }
    }
}

/// A bracket whose `start` sits at offset 0 of the buffer but whose `end` has
/// not arrived yet.
#[derive(Debug, Clone, Copy)]
struct OpenBracket {
    matcher: usize,
    /// Offset up to which `end` is known to be absent.
    searched: usize,
}

/// Stateful splitter over an ordered list of [`Matcher`]s.
///
/// On every feed the earliest match in the buffer wins; when two matchers hit
/// the same offset, the one declared first wins.
#[derive(Debug)]
pub struct Segmenter {
    matchers: Vec<Matcher>,
    buf: Vec<u8>,
    open: Option<OpenBracket>,
}

impl Segmenter {
    pub fn new(matchers: Vec<Matcher>) -> Self {
        Self {
            matchers,
            buf: Vec::new(),
            open: None,
        }
    }

    /// Append `chunk` and return every segment that is now complete.
    ///
    /// Zero-length segments are never produced.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.buf.extend_from_slice(chunk);
        let mut out = Vec::new();

        while !self.buf.is_empty() {
            let (idx, pos) = match self.open {
                Some(open) => (open.matcher, 0),
                None => match self.earliest_match() {
                    Some(found) => found,
                    None => break,
                },
            };

            match &self.matchers[idx] {
                Matcher::Delimiter(delim) => {
                    if pos > 0 {
                        out.push(self.buf[..pos].to_vec());
                    }
                    self.buf.drain(..pos + delim.len());
                }
                Matcher::Bracket { start, end } => {
                    if pos > 0 {
                        out.push(self.buf[..pos].to_vec());
                        self.buf.drain(..pos);
                    }

                    // The buffer now begins with `start`; it stays there until
                    // the matching `end` shows up.
                    let from = self.open.map_or(start.len(), |open| open.searched);
                    match find(&self.buf[from..], end) {
                        Some(rel) => {
                            let end_at = from + rel;
                            if end_at > start.len() {
                                out.push(self.buf[start.len()..end_at].to_vec());
                            }
                            self.buf.drain(..end_at + end.len());
                            self.open = None;
                        }
                        None => {
                            // A partial `end` may straddle the chunk boundary, so
                            // only the bytes that cannot be part of it count as
                            // searched.
                            let keep = end.len().saturating_sub(1);
                            let searched = self.buf.len().saturating_sub(keep).max(start.len());
                            self.open = Some(OpenBracket {
                                matcher: idx,
                                searched,
                            });
                            break;
                        }
                    }
                }
            }
        }

        out
    }

    /// Bytes received but not yet emitted as a segment.
    pub fn pending(&self) -> &[u8] {
        &self.buf
    }

    /// Consume the segmenter, returning whatever partial data is left.
    pub fn into_remainder(self) -> Vec<u8> {
        self.buf
    }

    fn earliest_match(&self) -> Option<(usize, usize)> {
        let mut best: Option<(usize, usize)> = None;
        for (idx, matcher) in self.matchers.iter().enumerate() {
            let Some(pos) = find(&self.buf, matcher.lead()) else {
                continue;
            };
            match best {
                Some((_, best_pos)) if best_pos <= pos => {}
                _ => best = Some((idx, pos)),
            }
        }
        best
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
