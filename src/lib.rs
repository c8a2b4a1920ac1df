//! Text kernel of a thought-sharing site: thoughtword auto-linking,
//! soft word breaks for overlong tokens, and word-level Markov
//! pseudo-thought generation.

pub mod breaks;
pub mod format;
pub mod linker;
pub mod markov;
pub mod segment;
pub mod vocab;

#[cfg(feature = "web")]
pub mod web;

pub use breaks::{BREAK_MARKER, insert_word_breaks};
pub use format::{
    CommonMark, FormatOptions, FormattedThought, Formatter, MarkdownRenderer, RenderCache,
    excerpt, strip_tags, strip_tags_keeping,
};
pub use linker::{LinkOptions, RouteTemplate, link_thoughtwords};
pub use markov::{ChainError, WordChain, generate_from_corpus, generate_thought};
pub use segment::{DelimiterRule, Segment, Segments, segments};
pub use vocab::{
    CachedWordSource, DEFAULT_MAX_WORD_LENGTH, ThoughtChange, Vocabulary, VocabularyVersion,
    WordSource, format_thoughtword, normalize_key,
};
