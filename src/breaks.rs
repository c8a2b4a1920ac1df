use crate::segment::{DelimiterRule, Segment, segments};

/// Soft break marker injected into overlong tokens. `<wbr />` renders
/// invisibly and does not survive plain-text extraction.
pub const BREAK_MARKER: &str = "<wbr />";

/// Inserts [`BREAK_MARKER`] into every untagged token longer than
/// `max_len` characters so a single pathological token cannot stretch the
/// page layout.
///
/// A marker follows each `max_len`-character block of such a token,
/// including the last one. Tags, whitespace, tokens starting with `<`,
/// and tokens of `max_len` characters or fewer pass through unchanged, so
/// stripping every marker from the output reconstructs the input. A
/// `max_len` of zero disables insertion.
pub fn insert_word_breaks(input: &str, max_len: usize) -> String {
    if max_len == 0 {
        return input.to_string();
    }
    let mut output = String::with_capacity(input.len());
    for segment in segments(input, DelimiterRule::AllTags) {
        match segment {
            Segment::Delimiter(text) => output.push_str(text),
            Segment::Content(chunk) => {
                if chunk.starts_with('<') || chunk.chars().count() <= max_len {
                    output.push_str(chunk);
                } else {
                    chunk_split_into(&mut output, chunk, max_len);
                }
            }
        }
    }
    output
}

fn chunk_split_into(out: &mut String, chunk: &str, max_len: usize) {
    let mut count = 0;
    for c in chunk.chars() {
        out.push(c);
        count += 1;
        if count == max_len {
            out.push_str(BREAK_MARKER);
            count = 0;
        }
    }
    if count > 0 {
        out.push_str(BREAK_MARKER);
    }
}
