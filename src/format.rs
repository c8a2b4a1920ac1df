use std::collections::HashSet;
use std::hash::Hasher;
use std::num::NonZeroUsize;

use lru::LruCache;
use markdown::{Options as MarkdownOptions, to_html_with_options};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use twox_hash::XxHash64;

use crate::breaks::insert_word_breaks;
use crate::linker::{LinkOptions, link_thoughtwords};
use crate::segment::{DelimiterRule, Segment, segments};
use crate::vocab::{DEFAULT_MAX_WORD_LENGTH, Vocabulary, VocabularyVersion};

/// Tags a rendered thought may keep; everything else the Markdown pass
/// emits (or a user smuggles through it) is stripped.
static ALLOWED_TAGS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "i",
        "b",
        "em",
        "strong",
        "ul",
        "ol",
        "li",
        "p",
        "br",
        "wbr",
        "blockquote",
    ]
    .into_iter()
    .collect()
});

/// Tags an excerpt may keep.
static EXCERPT_TAGS: Lazy<HashSet<&'static str>> =
    Lazy::new(|| ["i", "b", "em", "strong"].into_iter().collect());

/// Markdown-to-HTML collaborator. The formatting pipeline treats the
/// converter as string in, string out; swap in another implementation to
/// change dialects.
pub trait MarkdownRenderer: Send + Sync {
    fn render(&self, input: &str) -> String;
}

/// Default renderer on the `markdown` crate.
pub struct CommonMark;

impl MarkdownRenderer for CommonMark {
    fn render(&self, input: &str) -> String {
        let options = markdown_options();
        to_html_with_options(input, &options).unwrap_or_else(|_| input.to_string())
    }
}

fn markdown_options() -> MarkdownOptions {
    let mut options = MarkdownOptions::gfm();
    // User HTML is stripped before this pass and allow-listed after it,
    // so the renderer itself may let raw HTML through.
    options.compile.allow_dangerous_html = true;
    options.compile.gfm_tagfilter = false;
    options
}

/// Removes every `<...>` tag from `input`.
pub fn strip_tags(input: &str) -> String {
    strip_tags_impl(input, None)
}

/// Removes every `<...>` tag whose name is not in `allowed`.
pub fn strip_tags_keeping(input: &str, allowed: &HashSet<&str>) -> String {
    strip_tags_impl(input, Some(allowed))
}

fn strip_tags_impl(input: &str, allowed: Option<&HashSet<&str>>) -> String {
    let mut output = String::with_capacity(input.len());
    for segment in segments(input, DelimiterRule::AllTags) {
        match segment {
            Segment::Delimiter(text) if text.starts_with('<') => {
                let name = tag_name(text).to_ascii_lowercase();
                if allowed.is_some_and(|set| set.contains(name.as_str())) {
                    output.push_str(text);
                }
            }
            other => output.push_str(other.text()),
        }
    }
    output
}

/// Name of a `<...>` tag: leading `/` and attributes ignored.
fn tag_name(tag: &str) -> &str {
    let inner = tag
        .trim_start_matches('<')
        .trim_end_matches('>')
        .trim_start();
    let inner = inner.strip_prefix('/').unwrap_or(inner).trim_start();
    let end = inner
        .find(|c: char| !c.is_ascii_alphanumeric())
        .unwrap_or(inner.len());
    &inner[..end]
}

/// Settings for the full formatting pipeline.
#[derive(Debug, Clone)]
pub struct FormatOptions {
    /// Tokens longer than this get soft breaks; also the stored
    /// thoughtword length cap.
    pub max_word_length: usize,
    pub link: LinkOptions,
}

impl Default for FormatOptions {
    fn default() -> Self {
        FormatOptions {
            max_word_length: DEFAULT_MAX_WORD_LENGTH,
            link: LinkOptions::default(),
        }
    }
}

/// A rendered thought plus the vocabulary version it was rendered
/// against. Stored alongside the raw text so stale renders can be found
/// and refreshed when the word set changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormattedThought {
    pub html: String,
    pub formatting_key: VocabularyVersion,
}

impl FormattedThought {
    /// Whether this render predates the current vocabulary snapshot.
    pub fn is_stale(&self, vocabulary: &Vocabulary) -> bool {
        self.formatting_key != vocabulary.version()
    }
}

/// Converts user-entered thought text to what will be displayed:
/// user HTML removed, Markdown rendered, tags allow-listed, thoughtwords
/// linked, soft breaks inserted.
pub struct Formatter {
    options: FormatOptions,
    renderer: Box<dyn MarkdownRenderer>,
}

impl Formatter {
    pub fn new() -> Self {
        Self::with_options(FormatOptions::default())
    }

    pub fn with_options(options: FormatOptions) -> Self {
        Formatter {
            options,
            renderer: Box::new(CommonMark),
        }
    }

    pub fn with_renderer(mut self, renderer: Box<dyn MarkdownRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn options(&self) -> &FormatOptions {
        &self.options
    }

    pub fn format(&self, raw: &str, vocabulary: &Vocabulary) -> FormattedThought {
        // Remove all HTML added by the user.
        let text = strip_tags(raw);

        // Markdown to HTML, then drop tags outside the allow list.
        let text = self.renderer.render(&text);
        let text = strip_tags_keeping(&text, &ALLOWED_TAGS);

        let text = link_thoughtwords(&text, vocabulary, &self.options.link);
        let html = insert_word_breaks(&text, self.options.max_word_length);
        FormattedThought {
            html,
            formatting_key: vocabulary.version(),
        }
    }

    /// Re-renders a batch of thoughts whose formatting key no longer
    /// matches the vocabulary, e.g. after a thoughtword becomes
    /// populated. Returns `(id, render)` pairs in input order.
    pub fn reformat_stale(
        &self,
        vocabulary: &Vocabulary,
        stale: Vec<(u64, String)>,
    ) -> Vec<(u64, FormattedThought)> {
        if stale.is_empty() {
            info!("no stale thoughts found");
            return Vec::new();
        }
        let refreshed: Vec<(u64, FormattedThought)> = stale
            .into_par_iter()
            .map(|(id, thought)| {
                let formatted = self.format(&thought, vocabulary);
                debug!(id, "refreshed formatting");
                (id, formatted)
            })
            .collect();
        info!(count = refreshed.len(), "refreshed stale thoughts");
        refreshed
    }
}

impl Default for Formatter {
    fn default() -> Self {
        Formatter::new()
    }
}

/// First `max_chars` characters of a rendered thought with all tags but
/// bold and italics removed, for front-page teasers. Paragraph wrappers
/// vanish and breaks become spaces so lines do not run together.
pub fn excerpt(html: &str, max_chars: usize) -> String {
    let text = html.replace("<p>", "").replace("</p>", "");
    let text = text.replace("<br />", " ").replace("<br>", " ");
    let text = strip_tags_keeping(&text, &EXCERPT_TAGS);
    truncate_html(&text, max_chars).trim().to_string()
}

/// Truncates to at most `max_chars` visible characters without cutting a
/// word in half, appending an ellipsis and closing any open tags.
fn truncate_html(text: &str, max_chars: usize) -> String {
    let mut out = String::with_capacity(text.len());
    let mut open: Vec<&str> = Vec::new();
    let mut visible = 0;
    let mut truncated = false;
    for segment in segments(text, DelimiterRule::AllTags) {
        let piece = segment.text();
        if piece.starts_with('<') && !segment.is_content() {
            let name = tag_name(piece);
            if piece.starts_with("</") {
                if open.last() == Some(&name) {
                    open.pop();
                }
            } else if !piece.ends_with("/>") {
                open.push(name);
            }
            out.push_str(piece);
            continue;
        }
        let len = piece.chars().count();
        if visible + len > max_chars {
            truncated = true;
            break;
        }
        visible += len;
        out.push_str(piece);
    }
    if truncated {
        out.truncate(out.trim_end().len());
        out.push('…');
    }
    for name in open.iter().rev() {
        out.push_str("</");
        out.push_str(name);
        out.push('>');
    }
    out
}

/// Memoizes rendered thoughts keyed by their raw text. A hit counts only
/// while the cached formatting key matches the current vocabulary; a
/// changed vocabulary silently re-renders.
pub struct RenderCache {
    inner: Mutex<LruCache<u64, FormattedThought>>,
}

impl RenderCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        RenderCache {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get_or_format(
        &self,
        formatter: &Formatter,
        raw: &str,
        vocabulary: &Vocabulary,
    ) -> FormattedThought {
        let key = text_key(raw);
        if let Some(hit) = self.inner.lock().get(&key) {
            if !hit.is_stale(vocabulary) {
                return hit.clone();
            }
        }
        let formatted = formatter.format(raw, vocabulary);
        self.inner.lock().put(key, formatted.clone());
        formatted
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}

fn text_key(raw: &str) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(raw.as_bytes());
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn vocab(words: &[&str]) -> Vocabulary {
        Vocabulary::from_words(words.iter().copied())
    }

    #[test]
    fn strip_tags_removes_everything() {
        assert_eq!(
            strip_tags("<script>x</script> hi <p class=\"a\">ok</p>"),
            "x hi ok"
        );
        assert_eq!(strip_tags("no tags"), "no tags");
        assert_eq!(strip_tags(""), "");
    }

    #[test]
    fn strip_tags_keeping_honors_the_allow_list() {
        assert_eq!(
            strip_tags_keeping("<p>a</p><script>b</script><BR>", &ALLOWED_TAGS),
            "<p>a</p>b<BR>"
        );
        assert_eq!(
            strip_tags_keeping("<em x=1>fine</em>", &ALLOWED_TAGS),
            "<em x=1>fine</em>"
        );
    }

    #[test]
    fn tag_name_handles_closers_and_attributes() {
        assert_eq!(tag_name("<p>"), "p");
        assert_eq!(tag_name("</p>"), "p");
        assert_eq!(tag_name("<br />"), "br");
        assert_eq!(tag_name("<a href=\"x\">"), "a");
        assert_eq!(tag_name("<!-- c -->"), "");
    }

    #[test]
    fn format_links_and_keys_the_render() {
        let vocab = vocab(&["funhouse"]);
        let formatter = Formatter::new();
        let formatted = formatter.format("the funhouse is fun", &vocab);
        assert!(
            formatted
                .html
                .contains("<a href=\"/thoughts/word/funhouse\" class=\"thoughtword\">funhouse</a>"),
            "{}",
            formatted.html
        );
        assert_eq!(formatted.formatting_key, vocab.version());
        assert!(!formatted.is_stale(&vocab));
    }

    #[test]
    fn format_strips_user_html_but_keeps_markdown_emphasis() {
        let formatter = Formatter::new();
        let formatted = formatter.format("drop <script>this</script> keep *that*", &vocab(&[]));
        assert!(!formatted.html.contains("script"));
        assert!(formatted.html.contains("<em>that</em>"), "{}", formatted.html);
    }

    #[test]
    fn format_breaks_overlong_tokens() {
        let formatter = Formatter::new();
        let token = "x".repeat(70);
        let formatted = formatter.format(&token, &vocab(&[]));
        assert!(formatted.html.contains("<wbr />"), "{}", formatted.html);
    }

    #[test]
    fn render_becomes_stale_when_the_vocabulary_changes() {
        let before = vocab(&["cat"]);
        let formatted = Formatter::new().format("hello cat", &before);
        assert!(!formatted.is_stale(&before));
        let after = vocab(&["cat", "dog"]);
        assert!(formatted.is_stale(&after));
    }

    #[test]
    fn reformat_stale_rerenders_in_order() {
        let vocab = vocab(&["cat"]);
        let formatter = Formatter::new();
        let stale = vec![(1, "first cat".to_string()), (2, "second cat".to_string())];
        let refreshed = formatter.reformat_stale(&vocab, stale);
        assert_eq!(refreshed.len(), 2);
        assert_eq!(refreshed[0].0, 1);
        assert_eq!(refreshed[1].0, 2);
        assert!(refreshed.iter().all(|(_, f)| !f.is_stale(&vocab)));
        assert!(formatter.reformat_stale(&vocab, Vec::new()).is_empty());
    }

    #[test]
    fn excerpt_strips_paragraphs_and_truncates_on_word_boundaries() {
        assert_eq!(
            excerpt("<p>Hello <em>world</em> again</p>", 300),
            "Hello <em>world</em> again"
        );
        assert_eq!(
            excerpt("<p>First line.</p><p>Second line.</p>", 300),
            "First line.Second line."
        );
        assert_eq!(excerpt("<p>one two three four</p>", 9), "one two…");
    }

    #[test]
    fn excerpt_replaces_breaks_with_spaces() {
        assert_eq!(excerpt("line one<br />line two", 300), "line one line two");
    }

    #[test]
    fn excerpt_closes_open_tags_after_truncation() {
        let out = excerpt("<em>one two three four five</em>", 9);
        assert_eq!(out, "<em>one two…</em>");
    }

    static RENDER_CALLS: AtomicUsize = AtomicUsize::new(0);

    struct CountingRenderer;

    impl MarkdownRenderer for CountingRenderer {
        fn render(&self, input: &str) -> String {
            RENDER_CALLS.fetch_add(1, Ordering::SeqCst);
            input.to_string()
        }
    }

    #[test]
    fn render_cache_hits_until_the_vocabulary_moves() {
        let formatter = Formatter::new().with_renderer(Box::new(CountingRenderer));
        let cache = RenderCache::new(16);

        let before = vocab(&["cat"]);
        let first = cache.get_or_format(&formatter, "hello cat", &before);
        let second = cache.get_or_format(&formatter, "hello cat", &before);
        assert_eq!(first, second);
        assert_eq!(RENDER_CALLS.load(Ordering::SeqCst), 1);

        // A new vocabulary version forces a re-render of the same text.
        let after = vocab(&["cat", "dog"]);
        let third = cache.get_or_format(&formatter, "hello cat", &after);
        assert_eq!(RENDER_CALLS.load(Ordering::SeqCst), 2);
        assert_eq!(third.formatting_key, after.version());
    }
}
