//! Property tests for token chunking.

use mqrag::chunking::{Chunker, TokenChunker};
use mqrag::document::Document;
use proptest::prelude::*;

/// A body of `n` distinct whitespace-separated words, so each token can be
/// traced back to its position.
fn body(n: usize) -> String {
    (0..n).map(|i| format!("t{i}")).collect::<Vec<_>>().join(" ")
}

/// Token positions covered by a passage's text.
fn positions(text: &str) -> Vec<usize> {
    text.split_whitespace().map(|t| t[1..].parse().unwrap()).collect()
}

/// Chunk size and an overlap strictly smaller than it.
fn arb_window() -> impl Strategy<Value = (usize, usize)> {
    (1usize..40).prop_flat_map(|size| (Just(size), 0..size))
}

/// **Property: consecutive passages overlap by exactly the configured overlap**
/// *For any* body and any `chunk_size > overlap`, every pair of consecutive
/// passages shares exactly `overlap` tokens, every passage holds at most
/// `chunk_size` tokens, and together the passages cover the whole body.
mod prop_exact_overlap {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn consecutive_passages_share_exactly_overlap_tokens(
            token_count in 1usize..300,
            (size, overlap) in arb_window(),
        ) {
            let doc = Document::new("doc", body(token_count));
            let passages = TokenChunker::new(size, overlap).chunk(&doc);
            prop_assert!(!passages.is_empty());

            let windows: Vec<Vec<usize>> = passages.iter().map(|p| positions(&p.text)).collect();
            for window in &windows {
                prop_assert!(window.len() <= size);
                prop_assert!(window.windows(2).all(|w| w[1] == w[0] + 1));
            }
            for pair in windows.windows(2) {
                let shared = pair[0].iter().filter(|t| pair[1].contains(t)).count();
                prop_assert_eq!(shared, overlap);
            }

            prop_assert_eq!(windows[0][0], 0);
            prop_assert_eq!(*windows[windows.len() - 1].last().unwrap(), token_count - 1);
            for (position, passage) in passages.iter().enumerate() {
                prop_assert_eq!(passage.position, position);
                prop_assert_eq!(&passage.document_id, "doc");
            }
        }
    }
}

/// **Property: a body no longer than the chunk size yields one passage**
/// *For any* body of at most `chunk_size` tokens, the chunker returns exactly
/// one passage whose text is the whole (trimmed) body.
mod prop_short_body_single_passage {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn short_body_is_one_passage(
            words in proptest::collection::vec("[A-Za-z0-9:.,]{1,10}", 1..50),
            padding in "[ \n\t]{0,4}",
            extra in 0usize..20,
        ) {
            let text = words.join(" ");
            let size = words.len() + extra;
            let doc = Document::new("short", format!("{padding}{text}{padding}"));

            let passages = TokenChunker::new(size, size / 2).chunk(&doc);
            prop_assert_eq!(passages.len(), 1);
            prop_assert_eq!(&passages[0].text, &text);
        }
    }
}

/// **Property: blank bodies yield no passages**
/// *For any* whitespace-only body, chunking returns an empty sequence rather
/// than an error.
mod prop_blank_body_empty {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn blank_body_is_empty(blank in "[ \n\t\r]{0,20}", (size, overlap) in arb_window()) {
            let passages = TokenChunker::new(size, overlap).chunk(&Document::new("b", blank));
            prop_assert!(passages.is_empty());
        }
    }
}
