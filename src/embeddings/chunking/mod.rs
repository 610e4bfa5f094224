
use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use tracing::{debug, warn};

/// A bounded span of a document's text, ready for embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// The chunk text.
    pub content: String,
    /// Heading path for structured documents, e.g. `"Install > Linux"`.
    pub heading_path: Option<String>,
    /// Position of this chunk within its document.
    pub chunk_index: usize,
}

/// Configuration for the sliding-window splitter.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters.
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks of one document.
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 800,
            chunk_overlap: 120,
        }
    }
}

/// Deepest heading level that contributes to the heading path. Headings below
/// this are kept inline as ordinary content.
const MAX_HEADING_DEPTH: usize = 3;

/// Split a document, routing by format.
///
/// Structured (heading-bearing) documents are partitioned by heading first;
/// plain text goes straight through the sliding window.
#[inline]
pub fn split_document(text: &str, structured: bool, config: &ChunkingConfig) -> Vec<Chunk> {
    if structured {
        split_markdown(text, config)
    } else {
        split_text(text, config)
    }
}

/// Sliding-window split over plain text.
///
/// Windows are `chunk_size` characters and advance by `chunk_size -
/// chunk_overlap`. A window prefers to end on a paragraph break, then a
/// sentence end, then whitespace, searching back at most `chunk_overlap`
/// characters; otherwise it cuts hard at `chunk_size`. Empty or
/// whitespace-only input yields no chunks.
#[inline]
pub fn split_text(text: &str, config: &ChunkingConfig) -> Vec<Chunk> {
    let chunks = split_span(text, None, &mut 0, config);

    if chunks.is_empty() {
        warn!("Document produced no chunks (empty or whitespace-only)");
    }

    chunks
}

/// Heading-aware split for markdown documents.
///
/// The document is partitioned at ATX headings (levels 1 through
/// `MAX_HEADING_DEPTH`); each partition carries the heading path of the
/// headings above it and is then split by the sliding window. Heading lines
/// themselves move into metadata rather than chunk content.
#[inline]
pub fn split_markdown(text: &str, config: &ChunkingConfig) -> Vec<Chunk> {
    let headings = collect_headings(text);

    if headings.is_empty() {
        return split_text(text, config);
    }

    let mut chunks = Vec::new();
    let mut chunk_index = 0;
    // Heading text per level, e.g. path[0] holds the current H1.
    let mut path: Vec<Option<String>> = vec![None; MAX_HEADING_DEPTH];

    // Preamble before the first heading has no heading path.
    let preamble = slice_range(text, 0, headings[0].start);
    chunks.extend(split_span(&preamble, None, &mut chunk_index, config));

    for (i, heading) in headings.iter().enumerate() {
        path[heading.level - 1] = Some(heading.text.clone());
        for deeper in heading.level..MAX_HEADING_DEPTH {
            path[deeper] = None;
        }

        let heading_path = path
            .iter()
            .flatten()
            .cloned()
            .collect::<Vec<_>>()
            .join(" > ");

        let body_end = headings
            .get(i + 1)
            .map_or_else(|| text.len(), |next| next.start);
        let body = slice_range(text, heading.end, body_end);

        chunks.extend(split_span(
            &body,
            Some(heading_path),
            &mut chunk_index,
            config,
        ));
    }

    if chunks.is_empty() {
        warn!("Markdown document produced no chunks (empty or whitespace-only)");
    } else {
        debug!(
            "Split markdown into {} chunks across {} headings",
            chunks.len(),
            headings.len()
        );
    }

    chunks
}

/// Sliding-window split of one span, appending to a document-wide index.
fn split_span(
    text: &str,
    heading_path: Option<String>,
    chunk_index: &mut usize,
    config: &ChunkingConfig,
) -> Vec<Chunk> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    let size = config.chunk_size.max(1);
    let overlap = config.chunk_overlap.min(size.saturating_sub(1));

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let hard_end = (start + size).min(chars.len());
        let end = if hard_end == chars.len() {
            hard_end
        } else {
            find_break(&chars, start, hard_end, overlap)
        };

        chunks.push(Chunk {
            content: chars[start..end].iter().collect(),
            heading_path: heading_path.clone(),
            chunk_index: *chunk_index,
        });
        *chunk_index += 1;

        if end == chars.len() {
            break;
        }

        // Step back by the overlap, but always make forward progress.
        start = end.saturating_sub(overlap).max(start + 1);
    }

    chunks
}

/// Pick a cut point at or before `hard_end`, searching back at most `window`
/// characters: paragraph break, then sentence end, then whitespace, then a
/// hard cut.
fn find_break(chars: &[char], start: usize, hard_end: usize, window: usize) -> usize {
    let floor = hard_end.saturating_sub(window).max(start + 1);

    // Paragraph break: cut after a blank line.
    for pos in (floor..hard_end).rev() {
        if chars[pos] == '\n' && pos > 0 && chars[pos - 1] == '\n' {
            return pos + 1;
        }
    }

    // Sentence end: punctuation followed by whitespace; cut after the space.
    for pos in (floor..hard_end.saturating_sub(1)).rev() {
        if matches!(chars[pos], '.' | '!' | '?') && chars[pos + 1].is_whitespace() {
            return pos + 2;
        }
    }

    // Any whitespace.
    for pos in (floor..hard_end).rev() {
        if chars[pos].is_whitespace() {
            return pos + 1;
        }
    }

    hard_end
}

struct HeadingMarker {
    /// Byte offset where the heading begins.
    start: usize,
    /// Byte offset just past the heading.
    end: usize,
    /// 1-based level, at most `MAX_HEADING_DEPTH`.
    level: usize,
    text: String,
}

/// Find headings of level 1..=`MAX_HEADING_DEPTH` with their byte ranges.
fn collect_headings(text: &str) -> Vec<HeadingMarker> {
    let parser = Parser::new_ext(text, Options::empty());
    let mut headings = Vec::new();

    let mut current: Option<(usize, usize, String)> = None;
    for (event, range) in parser.into_offset_iter() {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                let depth = heading_depth(level);
                if depth <= MAX_HEADING_DEPTH {
                    current = Some((range.start, depth, String::new()));
                }
            }
            Event::Text(t) | Event::Code(t) => {
                if let Some((_, _, buf)) = current.as_mut() {
                    buf.push_str(&t);
                }
            }
            Event::End(TagEnd::Heading(_)) => {
                if let Some((start, depth, buf)) = current.take() {
                    headings.push(HeadingMarker {
                        start,
                        end: range.end,
                        level: depth,
                        text: buf.trim().to_string(),
                    });
                }
            }
            _ => {}
        }
    }

    headings
}

fn heading_depth(level: HeadingLevel) -> usize {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

/// Byte-range slice that tolerates ranges produced by the markdown parser.
fn slice_range(text: &str, start: usize, end: usize) -> String {
    text.get(start..end).unwrap_or_default().to_string()
}
