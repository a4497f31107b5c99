//! Sentence splitting and entity blinding
//!
//! Turns an annotated document into the sentences that co-mention a
//! head and a tail entity. Blinded text replaces the head mention with
//! `<e1><protein1/></e1>`, the tail mention with `<e2><protein2/></e2>`
//! and every other annotated entity with a numbered `<proteinN/>` token.

use pedl_core::{Annotation, Document, Entity, Sentence};

/// Highest placeholder index known to the model's tokenizer
pub const MAX_PLACEHOLDER: usize = 46;

const HEAD_TOKEN: &str = "<e1><protein1/></e1>";
const TAIL_TOKEN: &str = "<e2><protein2/></e2>";

/// Split text into sentence spans (character offsets, end exclusive)
///
/// A sentence ends after `.`, `!` or `?` followed by whitespace.
/// Leading and trailing whitespace is excluded from the spans.
pub fn split_sentences(chars: &[char]) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = 0;

    for i in 0..chars.len() {
        let terminal = matches!(chars[i], '.' | '!' | '?');
        let followed_by_space = chars.get(i + 1).is_some_and(|c| c.is_whitespace());
        if terminal && followed_by_space {
            push_trimmed(chars, start, i + 1, &mut spans);
            start = i + 1;
        }
    }
    push_trimmed(chars, start, chars.len(), &mut spans);

    spans
}

fn push_trimmed(chars: &[char], mut start: usize, mut end: usize, spans: &mut Vec<(usize, usize)>) {
    while start < end && chars[start].is_whitespace() {
        start += 1;
    }
    while end > start && chars[end - 1].is_whitespace() {
        end -= 1;
    }
    if start < end {
        spans.push((start, end));
    }
}

/// Sentences of `document` that mention both `head` and `tail`
pub fn co_mention_sentences(head: &Entity, tail: &Entity, document: &Document) -> Vec<Sentence> {
    if !document.mentions(head) || !document.mentions(tail) {
        return Vec::new();
    }

    let chars: Vec<char> = document.text.chars().collect();
    let mut annotations: Vec<&Annotation> = document
        .annotations
        .iter()
        .filter(|a| a.start < a.end && a.end <= chars.len())
        .collect();
    annotations.sort_by_key(|a| (a.start, a.end));

    let mut sentences = Vec::new();
    for (start, end) in split_sentences(&chars) {
        let inside: Vec<&Annotation> = annotations
            .iter()
            .copied()
            .filter(|a| a.start >= start && a.end <= end)
            .collect();

        let has_head = inside.iter().any(|a| a.refers_to(head));
        let has_tail = inside.iter().any(|a| a.refers_to(tail));
        if !(has_head && has_tail) {
            continue;
        }

        sentences.push(Sentence {
            text: chars[start..end].iter().collect(),
            text_blinded: blind(&chars, start, end, &inside, head, tail),
            pmid: document.pmid.clone(),
        });
    }

    sentences
}

/// Replace annotated mentions in `chars[start..end]` by placeholder tokens
fn blind(
    chars: &[char],
    start: usize,
    end: usize,
    annotations: &[&Annotation],
    head: &Entity,
    tail: &Entity,
) -> String {
    let mut blinded = String::new();
    let mut cursor = start;
    let mut next_placeholder = 3;

    for annotation in annotations {
        // Overlapping mentions: the first one wins
        if annotation.start < cursor {
            continue;
        }
        blinded.extend(&chars[cursor..annotation.start]);

        if annotation.refers_to(head) {
            blinded.push_str(HEAD_TOKEN);
        } else if annotation.refers_to(tail) {
            blinded.push_str(TAIL_TOKEN);
        } else {
            let index = next_placeholder.min(MAX_PLACEHOLDER);
            blinded.push_str(&format!("<protein{index}/>"));
            next_placeholder += 1;
        }
        cursor = annotation.end;
    }
    blinded.extend(&chars[cursor..end]);

    blinded
}

#[cfg(test)]
mod tests {
    use super::*;
    use pedl_core::EntityKind;

    fn annotation(text: &str, mention: &str, kind: EntityKind, id: &str) -> Annotation {
        let byte_start = text.find(mention).unwrap();
        let start = text[..byte_start].chars().count();
        Annotation {
            start,
            end: start + mention.chars().count(),
            mention: mention.to_string(),
            kind,
            ids: vec![id.to_string()],
        }
    }

    fn document(text: &str, annotations: Vec<Annotation>) -> Document {
        Document {
            pmid: "100".to_string(),
            text: text.to_string(),
            annotations,
        }
    }

    #[test]
    fn test_split_sentences() {
        let text: Vec<char> = "First one. Second one!  Third? 4.5 stays".chars().collect();
        let spans = split_sentences(&text);
        let sentences: Vec<String> = spans
            .iter()
            .map(|&(s, e)| text[s..e].iter().collect())
            .collect();
        assert_eq!(
            sentences,
            vec!["First one.", "Second one!", "Third?", "4.5 stays"]
        );
    }

    #[test]
    fn test_split_sentences_empty() {
        assert!(split_sentences(&[]).is_empty());
        let blank: Vec<char> = "   ".chars().collect();
        assert!(split_sentences(&blank).is_empty());
    }

    #[test]
    fn test_co_mention_and_blinding() {
        let text = "TP53 activates MDM2 with ATM. MDM2 alone.";
        let doc = document(
            text,
            vec![
                annotation(text, "TP53", EntityKind::Gene, "7157"),
                annotation(text, "MDM2", EntityKind::Gene, "4193"),
                annotation(text, "ATM", EntityKind::Gene, "472"),
            ],
        );

        let head = Entity::gene("7157");
        let tail = Entity::gene("4193");
        let sentences = co_mention_sentences(&head, &tail, &doc);

        assert_eq!(sentences.len(), 1);
        assert_eq!(sentences[0].text, "TP53 activates MDM2 with ATM.");
        assert_eq!(
            sentences[0].text_blinded,
            "<e1><protein1/></e1> activates <e2><protein2/></e2> with <protein3/>."
        );
        assert_eq!(sentences[0].pmid, "100");
    }

    #[test]
    fn test_direction_swaps_markers() {
        let text = "TP53 binds MDM2.";
        let doc = document(
            text,
            vec![
                annotation(text, "TP53", EntityKind::Gene, "7157"),
                annotation(text, "MDM2", EntityKind::Gene, "4193"),
            ],
        );

        let sentences = co_mention_sentences(&Entity::gene("4193"), &Entity::gene("7157"), &doc);
        assert_eq!(
            sentences[0].text_blinded,
            "<e2><protein2/></e2> binds <e1><protein1/></e1>."
        );
    }

    #[test]
    fn test_no_sentence_without_both_mentions() {
        let text = "TP53 is a tumor suppressor. MDM2 is an E3 ligase.";
        let doc = document(
            text,
            vec![
                annotation(text, "TP53", EntityKind::Gene, "7157"),
                annotation(text, "MDM2", EntityKind::Gene, "4193"),
            ],
        );

        let sentences = co_mention_sentences(&Entity::gene("7157"), &Entity::gene("4193"), &doc);
        assert!(sentences.is_empty());
    }

    #[test]
    fn test_kind_must_match() {
        let text = "Aspirin inhibits PTGS2.";
        let doc = document(
            text,
            vec![
                annotation(text, "Aspirin", EntityKind::Chemical, "MESH:D001241"),
                annotation(text, "PTGS2", EntityKind::Gene, "5743"),
            ],
        );

        let chem = Entity::chemical("MESH:D001241");
        let gene = Entity::gene("5743");
        assert_eq!(co_mention_sentences(&chem, &gene, &doc).len(), 1);
        assert!(co_mention_sentences(&Entity::gene("MESH:D001241"), &gene, &doc).is_empty());
    }

    #[test]
    fn test_non_ascii_offsets() {
        let text = "β-catenin (CTNNB1) binds APC.";
        let doc = document(
            text,
            vec![
                annotation(text, "CTNNB1", EntityKind::Gene, "1499"),
                annotation(text, "APC", EntityKind::Gene, "324"),
            ],
        );

        let sentences = co_mention_sentences(&Entity::gene("1499"), &Entity::gene("324"), &doc);
        assert_eq!(
            sentences[0].text_blinded,
            "β-catenin (<e1><protein1/></e1>) binds <e2><protein2/></e2>."
        );
    }
}
