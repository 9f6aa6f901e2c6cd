//! Oversized-reply chunking.
//!
//! Splits a reply into delivery-sized fragments, preferring blank-line
//! paragraph boundaries. A single paragraph longer than the limit degrades
//! to a fixed-size split at char boundaries, so no delivered fragment ever
//! exceeds the hard limit.

/// Prefix the caller renders in front of fragments after the first.
pub const CONTINUATION_MARKER: &str = "(continued...)";

/// Split `text` into ordered fragments, each at most `max_len` bytes.
///
/// Returns at least one fragment for non-empty input and an empty vec for
/// empty input. Concatenating the fragments (accepting boundary whitespace
/// normalization) reconstructs the text in order.
pub fn split(text: &str, max_len: usize) -> Vec<String> {
    let max_len = max_len.max(1);
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in text.split("\n\n") {
        let paragraph = paragraph.trim_end();
        for piece in bounded_pieces(paragraph, max_len) {
            if current.is_empty() {
                current = piece;
            } else if current.len() + 2 + piece.len() <= max_len {
                current.push_str("\n\n");
                current.push_str(&piece);
            } else {
                chunks.push(std::mem::take(&mut current));
                current = piece;
            }
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// A paragraph as-is, or fixed-size slices of it when it alone exceeds
/// the limit.
fn bounded_pieces(paragraph: &str, max_len: usize) -> Vec<String> {
    if paragraph.len() <= max_len {
        return vec![paragraph.to_string()];
    }

    let mut pieces = Vec::new();
    let mut rest = paragraph;
    while rest.len() > max_len {
        let mut cut = max_len;
        while cut > 0 && !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        if cut == 0 {
            // Limit smaller than one char; take the char whole rather
            // than stall.
            cut = rest.chars().next().map_or(rest.len(), char::len_utf8);
        }
        let (head, tail) = rest.split_at(cut);
        pieces.push(head.to_string());
        rest = tail;
    }
    if !rest.is_empty() {
        pieces.push(rest.to_string());
    }
    pieces
}
