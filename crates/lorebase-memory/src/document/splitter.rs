use std::ops::Range;

use super::types::{Chunk, Document};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SplitStrategy {
    #[default]
    Recursive,
    /// Prefer heading, code-fence, rule and list boundaries before falling
    /// back to the recursive separators.
    Markdown,
}

/// Sizes are measured in characters.
#[derive(Debug, Clone)]
pub struct SplitterConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub strategy: SplitStrategy,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            strategy: SplitStrategy::Recursive,
        }
    }
}

/// One tier of separators. A boundary is placed `cut` bytes into every match,
/// so the separator text itself is never dropped.
struct Level {
    patterns: &'static [&'static str],
    cut: usize,
}

const PARAGRAPH: Level = Level {
    patterns: &["\n\n"],
    cut: 2,
};
const LINE: Level = Level {
    patterns: &["\n"],
    cut: 1,
};
const SENTENCE: Level = Level {
    patterns: &[". ", "? ", "! "],
    cut: 2,
};
const WORD: Level = Level {
    patterns: &[" "],
    cut: 1,
};

const RECURSIVE_LEVELS: &[Level] = &[PARAGRAPH, LINE, SENTENCE, WORD];

const MARKDOWN_LEVELS: &[Level] = &[
    Level {
        patterns: &["\n# "],
        cut: 1,
    },
    Level {
        patterns: &["\n## "],
        cut: 1,
    },
    Level {
        patterns: &["\n### "],
        cut: 1,
    },
    Level {
        patterns: &["\n#### ", "\n##### ", "\n###### "],
        cut: 1,
    },
    Level {
        patterns: &["\n```"],
        cut: 1,
    },
    Level {
        patterns: &["\n---\n", "\n***\n", "\n___\n"],
        cut: 1,
    },
    PARAGRAPH,
    Level {
        patterns: &["\n- ", "\n* ", "\n+ ", "\n1. "],
        cut: 1,
    },
    LINE,
    SENTENCE,
    WORD,
];

impl Level {
    /// Sorted boundaries strictly inside `range`.
    fn boundaries(&self, text: &str, range: &Range<usize>) -> Vec<usize> {
        let slice = &text[range.clone()];
        let mut cuts: Vec<usize> = self
            .patterns
            .iter()
            .flat_map(|pat| slice.match_indices(pat).map(|(i, _)| range.start + i + self.cut))
            .filter(|&pos| pos > range.start && pos < range.end)
            .collect();
        cuts.sort_unstable();
        cuts.dedup();
        cuts
    }
}

pub struct TextSplitter {
    config: SplitterConfig,
}

impl TextSplitter {
    #[must_use]
    pub fn new(config: SplitterConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &SplitterConfig {
        &self.config
    }

    fn chunk_size(&self) -> usize {
        self.config.chunk_size.max(1)
    }

    fn overlap(&self) -> usize {
        self.config.chunk_overlap.min(self.chunk_size() - 1)
    }

    /// Split a document into chunks of at most `chunk_size` characters.
    ///
    /// Every chunk is an exact substring of the document; adjacent chunks
    /// share at most `chunk_overlap` characters, and [`reconstruct`] returns
    /// the original text.
    #[must_use]
    pub fn split(&self, document: &Document) -> Vec<Chunk> {
        let text = document.content.as_str();
        if text.is_empty() {
            return Vec::new();
        }

        let levels = match self.config.strategy {
            SplitStrategy::Recursive => RECURSIVE_LEVELS,
            SplitStrategy::Markdown => MARKDOWN_LEVELS,
        };

        let mut pieces = Vec::new();
        self.split_range(text, 0..text.len(), levels, &mut pieces);

        self.merge(text, &pieces)
            .into_iter()
            .enumerate()
            .map(|(i, range)| Chunk {
                content: text[range.clone()].to_owned(),
                metadata: document.metadata.clone(),
                chunk_index: i,
                offset: range.start,
            })
            .collect()
    }

    fn split_range(
        &self,
        text: &str,
        range: Range<usize>,
        levels: &[Level],
        out: &mut Vec<Range<usize>>,
    ) {
        if char_len(&text[range.clone()]) <= self.chunk_size() {
            out.push(range);
            return;
        }

        for (i, level) in levels.iter().enumerate() {
            let cuts = level.boundaries(text, &range);
            if cuts.is_empty() {
                continue;
            }
            let mut start = range.start;
            for end in cuts.into_iter().chain(std::iter::once(range.end)) {
                self.split_range(text, start..end, &levels[i + 1..], out);
                start = end;
            }
            return;
        }

        hard_split(text, range, self.chunk_size(), out);
    }

    /// Greedily pack pieces into chunks, re-using trailing pieces of the
    /// previous chunk as overlap.
    fn merge(&self, text: &str, pieces: &[Range<usize>]) -> Vec<Range<usize>> {
        let chunk_size = self.chunk_size();
        let overlap = self.overlap();
        let lens: Vec<usize> = pieces.iter().map(|r| char_len(&text[r.clone()])).collect();

        let mut chunks = Vec::new();
        let mut first = 0;
        let mut current = 0;

        for i in 0..pieces.len() {
            if current > 0 && current + lens[i] > chunk_size {
                chunks.push(pieces[first].start..pieces[i - 1].end);

                let mut carry_start = i;
                let mut carried = 0;
                // never carry the whole previous chunk
                while carry_start > first + 1 {
                    let j = carry_start - 1;
                    if carried + lens[j] > overlap || carried + lens[j] + lens[i] > chunk_size {
                        break;
                    }
                    carried += lens[j];
                    carry_start = j;
                }
                first = carry_start;
                current = carried;
            }
            current += lens[i];
        }

        if current > 0
            && let Some(last) = pieces.last()
        {
            chunks.push(pieces[first].start..last.end);
        }
        chunks
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn hard_split(text: &str, range: Range<usize>, chunk_size: usize, out: &mut Vec<Range<usize>>) {
    let mut start = range.start;
    let mut count = 0;
    for (i, _) in text[range.clone()].char_indices() {
        if count == chunk_size {
            out.push(start..range.start + i);
            start = range.start + i;
            count = 0;
        }
        count += 1;
    }
    if start < range.end {
        out.push(start..range.end);
    }
}

/// Rebuild document text from its chunks in order, dropping overlapped prefixes.
#[must_use]
pub fn reconstruct(chunks: &[Chunk]) -> String {
    let mut out = String::new();
    let mut end = 0;
    for chunk in chunks {
        if chunk.end() <= end {
            continue;
        }
        let skip = end.saturating_sub(chunk.offset);
        out.push_str(&chunk.content[skip..]);
        end = chunk.end();
    }
    out
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use proptest::prelude::*;

    use super::*;
    use crate::document::types::DocumentMetadata;

    fn doc(content: &str) -> Document {
        Document {
            content: content.to_owned(),
            metadata: DocumentMetadata {
                source: "test".to_owned(),
                content_type: "text/plain".to_owned(),
                extra: BTreeMap::new(),
            },
        }
    }

    fn splitter(size: usize, overlap: usize, strategy: SplitStrategy) -> TextSplitter {
        TextSplitter::new(SplitterConfig {
            chunk_size: size,
            chunk_overlap: overlap,
            strategy,
        })
    }

    fn contents(chunks: &[Chunk]) -> Vec<&str> {
        chunks.iter().map(|c| c.content.as_str()).collect()
    }

    #[test]
    fn empty_document_yields_no_chunks() {
        let chunks = TextSplitter::new(SplitterConfig::default()).split(&doc(""));
        assert!(chunks.is_empty());
    }

    #[test]
    fn short_document_single_chunk() {
        let chunks = TextSplitter::new(SplitterConfig::default()).split(&doc("Hello world."));
        assert_eq!(contents(&chunks), ["Hello world."]);
        assert_eq!(chunks[0].offset, 0);
    }

    #[test]
    fn sentences_split_without_overlap() {
        let chunks = splitter(3, 0, SplitStrategy::Recursive).split(&doc("A. B. C."));
        assert_eq!(contents(&chunks), ["A. ", "B. ", "C."]);
        assert_eq!(
            chunks.iter().map(|c| c.chunk_index).collect::<Vec<_>>(),
            [0, 1, 2]
        );
        assert_eq!(
            chunks.iter().map(|c| c.offset).collect::<Vec<_>>(),
            [0, 3, 6]
        );
    }

    #[test]
    fn overlap_repeats_trailing_words() {
        let text = "aaa bbb ccc ddd eee fff";
        let chunks = splitter(12, 4, SplitStrategy::Recursive).split(&doc(text));
        assert_eq!(contents(&chunks), ["aaa bbb ccc ", "ccc ddd eee ", "eee fff"]);
        for pair in chunks.windows(2) {
            assert!(pair[1].offset < pair[0].end(), "expected overlap");
        }
        assert_eq!(reconstruct(&chunks), text);
    }

    #[test]
    fn paragraph_boundary_preferred() {
        let text = "first paragraph here\n\nsecond paragraph here";
        let chunks = splitter(25, 0, SplitStrategy::Recursive).split(&doc(text));
        assert_eq!(
            contents(&chunks),
            ["first paragraph here\n\n", "second paragraph here"]
        );
    }

    #[test]
    fn unbroken_text_is_hard_split() {
        let chunks = splitter(4, 0, SplitStrategy::Recursive).split(&doc("abcdefghij"));
        assert_eq!(contents(&chunks), ["abcd", "efgh", "ij"]);
    }

    #[test]
    fn multibyte_characters_counted_as_chars() {
        let text = "ééééé";
        let chunks = splitter(2, 0, SplitStrategy::Recursive).split(&doc(text));
        assert_eq!(contents(&chunks), ["éé", "éé", "é"]);
        assert_eq!(reconstruct(&chunks), text);
    }

    #[test]
    fn markdown_splits_on_headings() {
        let text = "# Intro\nSome intro text.\n## Details\nMore details here.";
        let chunks = splitter(30, 0, SplitStrategy::Markdown).split(&doc(text));
        assert_eq!(
            contents(&chunks),
            ["# Intro\nSome intro text.\n", "## Details\nMore details here."]
        );
    }

    #[test]
    fn markdown_keeps_list_markers_with_items() {
        let text = "Items:\n- apples and pears\n- plums and cherries";
        let chunks = splitter(20, 0, SplitStrategy::Markdown).split(&doc(text));
        assert!(chunks.iter().skip(1).all(|c| c.content.starts_with("- ")));
        assert_eq!(reconstruct(&chunks), text);
    }

    #[test]
    fn oversized_overlap_is_clamped() {
        let text = "a b c d e f g h";
        let chunks = splitter(4, 10, SplitStrategy::Recursive).split(&doc(text));
        assert!(chunks.iter().all(|c| c.content.chars().count() <= 4));
        assert_eq!(reconstruct(&chunks), text);
    }

    #[test]
    fn chunks_carry_document_metadata() {
        let chunks = splitter(3, 0, SplitStrategy::Recursive).split(&doc("A. B."));
        assert!(chunks.iter().all(|c| c.source_id() == "test"));
    }

    fn check_invariants(text: &str, size: usize, overlap: usize, strategy: SplitStrategy) {
        let chunks = splitter(size, overlap, strategy).split(&doc(text));
        if text.is_empty() {
            assert!(chunks.is_empty());
            return;
        }
        assert_eq!(chunks[0].offset, 0);
        assert_eq!(chunks.last().unwrap().end(), text.len());
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i);
            assert!(!chunk.content.is_empty());
            assert!(chunk.content.chars().count() <= size);
            assert_eq!(&text[chunk.offset..chunk.end()], chunk.content);
        }
        for pair in chunks.windows(2) {
            assert!(pair[1].offset > pair[0].offset);
            assert!(pair[1].offset <= pair[0].end(), "gap between chunks");
            let shared = text[pair[1].offset..pair[0].end()].chars().count();
            assert!(shared <= overlap);
        }
        assert_eq!(reconstruct(&chunks), text);
    }

    proptest! {
        #[test]
        fn recursive_invariants(
            text in "[a-zé .!?\n]{0,1500}",
            size in 1usize..200,
            overlap in 0usize..80,
        ) {
            check_invariants(&text, size, overlap.min(size - 1), SplitStrategy::Recursive);
        }

        #[test]
        fn markdown_invariants(
            text in "[a-z #*\\-+`.\n]{0,1500}",
            size in 1usize..200,
            overlap in 0usize..80,
        ) {
            check_invariants(&text, size, overlap.min(size - 1), SplitStrategy::Markdown);
        }

        #[test]
        fn arbitrary_unicode_round_trips(text in "\\PC{0,800}", size in 1usize..100) {
            let chunks = splitter(size, size / 4, SplitStrategy::Recursive).split(&doc(&text));
            prop_assert_eq!(reconstruct(&chunks), text);
        }
    }
}
