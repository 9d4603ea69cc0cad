// Addressable CSS patch engine
//
// One logical stylesheet holds freeform prior content plus any number of
// named, comment-delimited blocks that can be upserted or removed without
// disturbing anything else. The document is a sequence of tagged segments,
// not a string that gets searched and spliced; that is what makes the
// round-trip and isolation guarantees hold.
//
// Rendered form of a block:
//
//   /* @begin hdr/color */
//   .portal-hdr { color: blue; }
//   /* @end hdr/color */
//
// Segments are joined by one blank line. `parse` is the left inverse of
// `render` for any document built through `upsert`/`remove`; marker spans
// that do not parse cleanly are kept as literal content.

use serde::{Deserialize, Serialize};

const BEGIN_PREFIX: &str = "/* @begin ";
const END_PREFIX: &str = "/* @end ";
const MARKER_SUFFIX: &str = " */";
const KEY_SEPARATOR: char = '/';

/// Identifies one block: a source element identifier and a preference
/// (aspect) identifier. The engine treats the pair as an atomic string
/// `element/preference` and never interprets the halves. The element
/// identifier must not contain the separator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockKey {
    pub element: String,
    pub preference: String,
}

impl BlockKey {
    pub fn new(element: impl Into<String>, preference: impl Into<String>) -> Self {
        Self {
            element: element.into(),
            preference: preference.into(),
        }
    }

    fn id(&self) -> String {
        format!("{}{}{}", self.element, KEY_SEPARATOR, self.preference)
    }

    fn from_id(id: &str) -> Option<Self> {
        let (element, preference) = id.split_once(KEY_SEPARATOR)?;
        if element.is_empty() || preference.is_empty() {
            return None;
        }
        Some(Self::new(element, preference))
    }
}

impl std::fmt::Display for BlockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.id())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Opaque prior text; the engine never rewrites it.
    Literal(String),
    Block { key: BlockKey, body: String },
}

/// The single logical stylesheet under management. All mutation goes
/// through `upsert`/`remove`, which return a new document; no caller does
/// string surgery on the rendered form.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StyleDocument {
    segments: Vec<Segment>,
}

impl StyleDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Body of the block with `key`, if present.
    pub fn get(&self, key: &BlockKey) -> Option<&str> {
        self.segments.iter().find_map(|seg| match seg {
            Segment::Block { key: k, body } if k == key => Some(body.as_str()),
            _ => None,
        })
    }

    pub fn keys(&self) -> impl Iterator<Item = &BlockKey> + '_ {
        self.segments.iter().filter_map(|seg| match seg {
            Segment::Block { key, .. } => Some(key),
            _ => None,
        })
    }

    /// Replace the body of the block with `key` in place, or append a new
    /// block at the end. Idempotent; first-insertion order is preserved on
    /// update.
    #[must_use]
    pub fn upsert(&self, key: &BlockKey, body: &str) -> StyleDocument {
        let body = body.trim_matches('\n').to_string();
        let mut segments = self.segments.clone();
        match segments.iter_mut().find_map(|seg| match seg {
            Segment::Block { key: k, body } if k == key => Some(body),
            _ => None,
        }) {
            Some(existing) => *existing = body,
            None => segments.push(Segment::Block {
                key: key.clone(),
                body,
            }),
        }
        StyleDocument { segments }
    }

    /// Delete the block with `key`. Returns an equal document when the key
    /// is absent. Adjacent literal segments are merged with one blank line
    /// so removal never leaves stacked padding.
    #[must_use]
    pub fn remove(&self, key: &BlockKey) -> StyleDocument {
        let Some(pos) = self.segments.iter().position(
            |seg| matches!(seg, Segment::Block { key: k, .. } if k == key),
        ) else {
            return self.clone();
        };
        let mut segments = self.segments.clone();
        segments.remove(pos);

        // Removal may leave two literals adjacent; merge them so the
        // rendered padding collapses to a single blank line.
        if pos > 0 && pos < segments.len() {
            if let (Segment::Literal(a), Segment::Literal(b)) =
                (&segments[pos - 1], &segments[pos])
            {
                let merged = format!("{}\n\n{}", a, b);
                segments[pos - 1] = Segment::Literal(merged);
                segments.remove(pos);
            }
        }
        StyleDocument { segments }
    }

    /// Deterministic serialization: literal prologue, then each block
    /// wrapped in begin/end markers, segments joined by one blank line.
    pub fn render(&self) -> String {
        let pieces: Vec<String> = self
            .segments
            .iter()
            .map(|seg| match seg {
                Segment::Literal(text) => text.clone(),
                Segment::Block { key, body } => format!(
                    "{}{}{}\n{}\n{}{}{}",
                    BEGIN_PREFIX,
                    key.id(),
                    MARKER_SUFFIX,
                    body,
                    END_PREFIX,
                    key.id(),
                    MARKER_SUFFIX
                ),
            })
            .collect();
        pieces.join("\n\n")
    }

    /// Parse rendered or externally supplied text back into segments.
    ///
    /// Left inverse of `render` for documents produced through
    /// `upsert`/`remove`. Any span whose markers are malformed, mismatched,
    /// or unterminated is kept as literal content rather than rejected, so
    /// adopting an arbitrary existing stylesheet is always safe.
    pub fn parse(text: &str) -> StyleDocument {
        // Drops the single trailing blank line that separated the literal
        // from the block that follows it.
        fn flush_literal(pending: &mut Vec<&str>, segments: &mut Vec<Segment>) {
            if pending.last().is_some_and(|l| l.is_empty()) {
                pending.pop();
            }
            if !pending.is_empty() {
                segments.push(Segment::Literal(pending.join("\n")));
                pending.clear();
            }
        }

        let mut segments: Vec<Segment> = Vec::new();
        let mut pending: Vec<&str> = Vec::new();
        // One blank line after a block is the segment separator, not content.
        let mut swallow_separator = false;

        let mut lines = text.lines();
        while let Some(line) = lines.next() {
            if swallow_separator {
                swallow_separator = false;
                if line.is_empty() {
                    continue;
                }
            }

            let begin_key = marker_key(line, BEGIN_PREFIX).and_then(|id| BlockKey::from_id(&id));
            let Some(key) = begin_key else {
                pending.push(line);
                continue;
            };

            // Collect body lines until the matching end marker.
            let key_id = key.id();
            let mut body: Vec<&str> = Vec::new();
            let mut terminated = false;
            for body_line in lines.by_ref() {
                if marker_key(body_line, END_PREFIX).as_deref() == Some(key_id.as_str()) {
                    terminated = true;
                    break;
                }
                body.push(body_line);
            }

            if terminated {
                flush_literal(&mut pending, &mut segments);
                segments.push(Segment::Block {
                    key,
                    body: body.join("\n"),
                });
                swallow_separator = true;
            } else {
                // Unterminated block: keep the whole span as literal.
                pending.push(line);
                pending.extend(body);
            }
        }
        flush_literal(&mut pending, &mut segments);
        StyleDocument { segments }
    }
}

fn marker_key(line: &str, prefix: &str) -> Option<String> {
    let trimmed = line.trim();
    let rest = trimmed.strip_prefix(prefix)?;
    let key = rest.strip_suffix(MARKER_SUFFIX)?;
    if key.is_empty() || key.contains("*/") || key.contains(char::is_whitespace) {
        return None;
    }
    Some(key.to_string())
}
