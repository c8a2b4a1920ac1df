/// Delimiter grammar used when splitting text into segments.
///
/// The linking pass must leave inline formatting tags alone but treat any
/// other `<` as ordinary text; the word-break pass skips every tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelimiterRule {
    /// A single space, `\n`, `\r`, or one of the literal inline tags
    /// `<i>`, `</i>`, `<b>`, `</b>`.
    InlineTags,
    /// A single space, `\n`, `\r`, or any `<...>` run. A `<` with no
    /// closing `>` is not a tag.
    AllTags,
}

impl DelimiterRule {
    /// Length in bytes of the delimiter starting at the front of `rest`,
    /// or `None` if `rest` does not start with a delimiter.
    fn match_len(self, rest: &str) -> Option<usize> {
        let first = rest.as_bytes().first()?;
        match first {
            b' ' | b'\n' | b'\r' => Some(1),
            b'<' => match self {
                DelimiterRule::InlineTags => {
                    for tag in ["<i>", "</i>", "<b>", "</b>"] {
                        if rest.starts_with(tag) {
                            return Some(tag.len());
                        }
                    }
                    None
                }
                DelimiterRule::AllTags => rest.find('>').map(|end| end + 1),
            },
            _ => None,
        }
    }
}

/// One span of the original input: either a delimiter preserved verbatim
/// or a content chunk eligible for further processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    Delimiter(&'a str),
    Content(&'a str),
}

impl<'a> Segment<'a> {
    pub fn text(&self) -> &'a str {
        match *self {
            Segment::Delimiter(text) | Segment::Content(text) => text,
        }
    }

    pub fn is_content(&self) -> bool {
        matches!(self, Segment::Content(_))
    }
}

/// Splits `input` into alternating delimiter and content segments.
///
/// Concatenating the segments in order reproduces `input` exactly; an
/// empty input yields no segments. The iterator borrows the input, so
/// restarting is just calling this again.
pub fn segments(input: &str, rule: DelimiterRule) -> Segments<'_> {
    Segments {
        rest: input,
        rule,
    }
}

pub struct Segments<'a> {
    rest: &'a str,
    rule: DelimiterRule,
}

impl<'a> Iterator for Segments<'a> {
    type Item = Segment<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }
        if let Some(len) = self.rule.match_len(self.rest) {
            let (delimiter, rest) = self.rest.split_at(len);
            self.rest = rest;
            return Some(Segment::Delimiter(delimiter));
        }
        // Scan forward to the start of the next delimiter.
        let mut end = self.rest.len();
        for (index, _) in self.rest.char_indices().skip(1) {
            if self.rule.match_len(&self.rest[index..]).is_some() {
                end = index;
                break;
            }
        }
        let (content, rest) = self.rest.split_at(end);
        self.rest = rest;
        Some(Segment::Content(content))
    }
}
