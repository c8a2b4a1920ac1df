use std::collections::{BTreeMap, HashSet};
use std::hash::Hasher;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use twox_hash::XxHash64;

/// Maximum length of a stored thoughtword, in characters.
pub const DEFAULT_MAX_WORD_LENGTH: usize = 30;

/// Reduces a chunk of text to its canonical comparison key: every
/// character that is not an ASCII letter or digit is removed and the
/// remainder is lowercased.
///
/// `normalize_key("Fun-House!")` is `"funhouse"`. The function is pure and
/// idempotent; an input with no alphanumeric characters yields `""`.
pub fn normalize_key(chunk: &str) -> String {
    chunk
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Converts user input into a valid thoughtword: normalized and truncated
/// to `max_len` characters.
pub fn format_thoughtword(word: &str, max_len: usize) -> String {
    let mut word = normalize_key(word);
    // All-ASCII after normalization, so byte truncation is safe.
    word.truncate(max_len);
    word
}

/// Opaque fingerprint of a vocabulary snapshot. Changes exactly when the
/// word set changes; used as the cache-invalidation token for rendered
/// text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VocabularyVersion(u64);

impl VocabularyVersion {
    fn of(words: &[String]) -> Self {
        let mut hasher = XxHash64::with_seed(0);
        for word in words {
            hasher.write(word.as_bytes());
            hasher.write_u8(0);
        }
        VocabularyVersion(hasher.finish())
    }
}

impl Default for VocabularyVersion {
    fn default() -> Self {
        VocabularyVersion::of(&[])
    }
}

/// The set of populated thoughtwords: distinct, normalized, sorted.
///
/// Ordered iteration comes from the sorted list; membership tests go
/// through a hash index. A snapshot is immutable once built, so it can be
/// shared across threads behind an `Arc` and consulted concurrently.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    words: Vec<String>,
    index: HashSet<String>,
    version: VocabularyVersion,
}

impl Vocabulary {
    /// Builds a vocabulary from raw words. Each entry is normalized and
    /// truncated to [`DEFAULT_MAX_WORD_LENGTH`]; empty results are
    /// dropped and duplicates collapse.
    pub fn from_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::from_words_with_max(words, DEFAULT_MAX_WORD_LENGTH)
    }

    pub fn from_words_with_max<I, S>(words: I, max_len: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut index: HashSet<String> = words
            .into_iter()
            .map(|word| format_thoughtword(word.as_ref(), max_len))
            .filter(|word| !word.is_empty())
            .collect();
        let mut words: Vec<String> = index.iter().cloned().collect();
        words.sort();
        index.shrink_to_fit();
        let version = VocabularyVersion::of(&words);
        Vocabulary {
            words,
            index,
            version,
        }
    }

    pub fn empty() -> Self {
        Self::from_words(std::iter::empty::<&str>())
    }

    /// Whether `key` (an already-normalized word) is a populated
    /// thoughtword. A miss is never an error.
    pub fn contains(&self, key: &str) -> bool {
        self.index.contains(key)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Words in alphabetical order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.words.iter().map(String::as_str)
    }

    pub fn version(&self) -> VocabularyVersion {
        self.version
    }

    /// Words grouped by first letter, with digit-initial words collected
    /// under `'#'`.
    pub fn alphabetical_groups(&self) -> BTreeMap<char, Vec<&str>> {
        let mut groups: BTreeMap<char, Vec<&str>> = BTreeMap::new();
        for word in self.iter() {
            let Some(first) = word.chars().next() else {
                continue;
            };
            let bucket = if first.is_ascii_digit() { '#' } else { first };
            groups.entry(bucket).or_default().push(word);
        }
        groups
    }
}

/// Storage collaborator: supplies the current list of populated
/// thoughtwords. Implementations typically query a thoughts table for
/// distinct words.
pub trait WordSource: Send + Sync {
    fn get_words(&self) -> Vec<String>;
}

impl<F> WordSource for F
where
    F: Fn() -> Vec<String> + Send + Sync,
{
    fn get_words(&self) -> Vec<String> {
        self()
    }
}

/// A change to a stored thought, as reported by the storage collaborator.
/// Drives vocabulary cache invalidation; see [`CachedWordSource::notify`].
#[derive(Debug, Clone)]
pub enum ThoughtChange {
    /// A thought was created under `word`; `population` is the number of
    /// thoughts on that word after the save.
    Created { word: String, population: usize },
    /// An existing thought was edited. `word_changed` is whether the edit
    /// moved it to a different word.
    Updated { word_changed: bool },
    /// A thought was deleted from `word`.
    Deleted { word: String },
}

impl ThoughtChange {
    fn may_alter_vocabulary(&self) -> bool {
        match self {
            // A new thought on an already-populated word changes nothing.
            ThoughtChange::Created { population, .. } => *population <= 1,
            ThoughtChange::Updated { word_changed } => *word_changed,
            ThoughtChange::Deleted { .. } => true,
        }
    }
}

/// Memoizes the vocabulary built from a [`WordSource`].
///
/// Reads hand out the current `Arc<Vocabulary>` snapshot; refresh and
/// invalidation are the only mutation points and are internally
/// synchronized, so callers may hold snapshots across a refresh.
pub struct CachedWordSource<S> {
    source: S,
    cached: RwLock<Option<Arc<Vocabulary>>>,
}

impl<S: WordSource> CachedWordSource<S> {
    pub fn new(source: S) -> Self {
        CachedWordSource {
            source,
            cached: RwLock::new(None),
        }
    }

    /// The current vocabulary snapshot, building it from the source if no
    /// memoized copy exists.
    pub fn vocabulary(&self) -> Arc<Vocabulary> {
        if let Some(vocab) = self.cached.read().clone() {
            return vocab;
        }
        self.refresh()
    }

    /// Rebuilds the snapshot from the source unconditionally.
    pub fn refresh(&self) -> Arc<Vocabulary> {
        let vocab = Arc::new(Vocabulary::from_words(self.source.get_words()));
        debug!(
            words = vocab.len(),
            version = ?vocab.version(),
            "rebuilt thoughtword vocabulary"
        );
        *self.cached.write() = Some(Arc::clone(&vocab));
        vocab
    }

    /// Drops the memoized snapshot; the next read rebuilds it.
    pub fn invalidate(&self) {
        *self.cached.write() = None;
    }

    /// Reacts to a stored-thought change. Edits that cannot alter the word
    /// set are ignored; anything else rebuilds the snapshot immediately,
    /// so the rebuild delay lands on the poster rather than the next
    /// viewer.
    pub fn notify(&self, change: &ThoughtChange) {
        if !change.may_alter_vocabulary() {
            return;
        }
        info!(?change, "thought change invalidates vocabulary");
        self.invalidate();
        self.refresh();
    }
}
