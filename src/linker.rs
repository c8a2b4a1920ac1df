use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};

use crate::segment::{DelimiterRule, Segment, segments};
use crate::vocab::{Vocabulary, normalize_key};

/// URL template for thoughtword pages. The `{word}` placeholder receives
/// the percent-encoded normalized word.
#[derive(Debug, Clone)]
pub struct RouteTemplate {
    template: String,
}

impl RouteTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        RouteTemplate {
            template: template.into(),
        }
    }

    pub fn url_for(&self, word: &str) -> String {
        let encoded = utf8_percent_encode(word, NON_ALPHANUMERIC).to_string();
        self.template.replace("{word}", &encoded)
    }
}

impl Default for RouteTemplate {
    fn default() -> Self {
        RouteTemplate::new("/thoughts/word/{word}")
    }
}

/// Anchor construction settings for [`link_thoughtwords`].
#[derive(Debug, Clone)]
pub struct LinkOptions {
    pub route: RouteTemplate,
    /// CSS class stamped on every generated anchor so downstream styling
    /// and selection can find them.
    pub css_class: String,
}

impl Default for LinkOptions {
    fn default() -> Self {
        LinkOptions {
            route: RouteTemplate::default(),
            css_class: "thoughtword".to_string(),
        }
    }
}

/// Rewrites `input` so every occurrence of a vocabulary word becomes an
/// anchor.
///
/// Whitespace and inline tags pass through verbatim; content chunks whose
/// normalized key misses the vocabulary are emitted unchanged, so with an
/// empty vocabulary the output equals the input exactly. Matches are
/// wrapped according to where the word sits in the chunk:
///
/// - intact (the key survives contiguously, as `"Funhouse"` does inside
///   `"(Funhouse)"`): only the leftmost occurrence of the key's characters
///   is wrapped and surrounding punctuation stays outside;
/// - split (punctuation interleaves the word, as in `"fun-house"`): the
///   outermost leading and trailing symbol runs stay outside and
///   everything between them, interior punctuation included, becomes the
///   anchor text.
pub fn link_thoughtwords(input: &str, vocabulary: &Vocabulary, options: &LinkOptions) -> String {
    let mut output = String::with_capacity(input.len());
    for segment in segments(input, DelimiterRule::InlineTags) {
        match segment {
            Segment::Delimiter(text) => output.push_str(text),
            Segment::Content(chunk) => link_chunk(chunk, vocabulary, options, &mut output),
        }
    }
    output
}

fn link_chunk(chunk: &str, vocabulary: &Vocabulary, options: &LinkOptions, out: &mut String) {
    let key = normalize_key(chunk);
    if key.is_empty() || !vocabulary.contains(&key) {
        out.push_str(chunk);
        return;
    }
    let url = options.route.url_for(&key);

    if let Some(pos) = find_ascii_ignore_case(chunk, &key) {
        let matched = &chunk[pos..pos + key.len()];
        out.push_str(&chunk[..pos]);
        push_anchor(out, &url, &options.css_class, matched);
        out.push_str(&chunk[pos + key.len()..]);
        return;
    }

    let (lead, middle, trail) = trim_outer_symbol_runs(chunk);
    out.push_str(lead);
    push_anchor(out, &url, &options.css_class, middle);
    out.push_str(trail);
}

fn push_anchor(out: &mut String, url: &str, class: &str, text: &str) {
    out.push_str("<a href=\"");
    out.push_str(url);
    out.push_str("\" class=\"");
    out.push_str(class);
    out.push_str("\">");
    out.push_str(text);
    out.push_str("</a>");
}

/// Byte offset of the leftmost ASCII-case-insensitive occurrence of
/// `needle` in `haystack`. The needle is all-ASCII, so a hit is always on
/// char boundaries.
fn find_ascii_ignore_case(haystack: &str, needle: &str) -> Option<usize> {
    let haystack = haystack.as_bytes();
    let needle = needle.as_bytes();
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle))
}

/// Splits a chunk into its leading non-alphanumeric run, the span from
/// the first through the last alphanumeric character, and the trailing
/// non-alphanumeric run. Interior symbol runs are left in the middle.
fn trim_outer_symbol_runs(chunk: &str) -> (&str, &str, &str) {
    let bytes = chunk.as_bytes();
    let Some(start) = bytes.iter().position(|b| b.is_ascii_alphanumeric()) else {
        return (chunk, "", "");
    };
    let end = bytes
        .iter()
        .rposition(|b| b.is_ascii_alphanumeric())
        .map(|index| index + 1)
        .unwrap_or(chunk.len());
    (&chunk[..start], &chunk[start..end], &chunk[end..])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocab(words: &[&str]) -> Vocabulary {
        Vocabulary::from_words(words.iter().copied())
    }

    fn link(input: &str, words: &[&str]) -> String {
        link_thoughtwords(input, &vocab(words), &LinkOptions::default())
    }

    #[test]
    fn empty_vocabulary_round_trips_exactly() {
        let inputs = [
            "",
            "The dog ran.",
            "tags <i>stay</i> put\nand so\rdo breaks",
            "...punctuation!!! <b></b>",
        ];
        for input in inputs {
            assert_eq!(link(input, &[]), input);
        }
    }

    #[test]
    fn non_matching_text_passes_through() {
        assert_eq!(link("The dog ran.", &["cat"]), "The dog ran.");
    }

    #[test]
    fn intact_match_keeps_punctuation_outside() {
        assert_eq!(
            link("Visit the (Funhouse) today", &["funhouse"]),
            "Visit the (<a href=\"/thoughts/word/funhouse\" class=\"thoughtword\">Funhouse</a>) today"
        );
    }

    #[test]
    fn split_match_links_interior_punctuation() {
        assert_eq!(
            link("fun-house is fun", &["funhouse"]),
            "<a href=\"/thoughts/word/funhouse\" class=\"thoughtword\">fun-house</a> is fun"
        );
    }

    #[test]
    fn split_match_trims_only_the_outermost_runs() {
        assert_eq!(
            link("...fun-house...", &["funhouse"]),
            "...<a href=\"/thoughts/word/funhouse\" class=\"thoughtword\">fun-house</a>..."
        );
    }

    #[test]
    fn intact_match_inside_ellipses() {
        // The word survives contiguously, so this is an intact match even
        // though the chunk is punctuation-heavy.
        assert_eq!(
            link("...funhouse...", &["funhouse"]),
            "...<a href=\"/thoughts/word/funhouse\" class=\"thoughtword\">funhouse</a>..."
        );
    }

    #[test]
    fn leftmost_occurrence_wins() {
        assert_eq!(
            link("FUNHOUSE", &["funhouse"]),
            "<a href=\"/thoughts/word/funhouse\" class=\"thoughtword\">FUNHOUSE</a>"
        );
    }

    #[test]
    fn chunks_inside_inline_tags_are_linked() {
        assert_eq!(
            link("<b>funhouse</b>", &["funhouse"]),
            "<b><a href=\"/thoughts/word/funhouse\" class=\"thoughtword\">funhouse</a></b>"
        );
    }

    #[test]
    fn every_matching_chunk_is_linked() {
        let out = link("funhouse funhouse", &["funhouse"]);
        assert_eq!(out.matches("<a href=").count(), 2);
    }

    #[test]
    fn all_punctuation_chunk_never_links() {
        // Normalizes to the empty key, which can never be in the
        // vocabulary, so no anchor to an empty word is possible.
        assert_eq!(link("!!! ...", &["funhouse"]), "!!! ...");
    }

    #[test]
    fn digits_participate_in_matching() {
        assert_eq!(
            link("(area51)", &["area51"]),
            "(<a href=\"/thoughts/word/area51\" class=\"thoughtword\">area51</a>)"
        );
    }

    #[test]
    fn adversarial_input_does_not_panic() {
        let nasty = "\u{0}<<<>>\u{7f}é\u{300}…<i>…</i>  \r\n";
        let out = link(nasty, &["funhouse"]);
        assert_eq!(out, nasty);
    }

    #[test]
    fn route_template_percent_encodes() {
        let route = RouteTemplate::new("/t/{word}");
        assert_eq!(route.url_for("funhouse"), "/t/funhouse");
        assert_eq!(route.url_for("naïve words"), "/t/na%C3%AFve%20words");
    }

    #[test]
    fn custom_options_are_honored() {
        let options = LinkOptions {
            route: RouteTemplate::new("/w/{word}"),
            css_class: "term".to_string(),
        };
        let out = link_thoughtwords("cat", &vocab(&["cat"]), &options);
        assert_eq!(out, "<a href=\"/w/cat\" class=\"term\">cat</a>");
    }
}
