//! Inline mark rendering.

use super::{Node, Vocabulary};
use crate::content::{MAX_DEPTH, Mark};

/// Wrap `text` in one element per mark.
///
/// The first mark becomes the outermost wrapper and the last mark directly
/// encloses the text. No marks yields a bare text node.
pub fn render_marks<V: Vocabulary + ?Sized>(vocab: &V, marks: &[Mark], text: &str) -> Node {
    let marks = &marks[..marks.len().min(MAX_DEPTH)];
    marks
        .iter()
        .rev()
        .fold(Node::text(text), |inner, mark| vocab.mark(mark).with_child(inner).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::tests::TestVocab;
    use proptest::prelude::*;

    fn mark_strategy() -> impl Strategy<Value = Mark> {
        prop_oneof![
            Just(Mark::Bold),
            Just(Mark::Italic),
            Just(Mark::Underline),
            Just(Mark::Strike),
            "[a-z]{1,8}".prop_map(Mark::Unknown),
        ]
    }

    /// Element names from the outermost wrapper down to the text.
    fn wrapper_chain(node: &Node) -> (Vec<&'static str>, String) {
        let mut names = Vec::new();
        let mut current = node;
        loop {
            match current {
                Node::Text(text) => return (names, text.clone()),
                Node::Element(el) => {
                    names.push(el.name);
                    assert_eq!(el.children.len(), 1);
                    current = &el.children[0];
                }
            }
        }
    }

    #[test]
    fn test_no_marks_is_plain_text() {
        assert_eq!(render_marks(&TestVocab, &[], "plain"), Node::text("plain"));
    }

    #[test]
    fn test_first_mark_is_outermost() {
        let node = render_marks(&TestVocab, &[Mark::Bold, Mark::Italic], "x");
        assert_eq!(node.to_xml(), "<b><i>x</i></b>");

        let node = render_marks(&TestVocab, &[Mark::Italic, Mark::Bold], "x");
        assert_eq!(node.to_xml(), "<i><b>x</b></i>");
    }

    #[test]
    fn test_unknown_mark_is_neutral_wrapper() {
        let node = render_marks(&TestVocab, &[Mark::Unknown("glow".into())], "x");
        assert_eq!(node.to_xml(), "<span>x</span>");
    }

    proptest! {
        #[test]
        fn prop_nesting_follows_mark_order(
            marks in prop::collection::vec(mark_strategy(), 0..8),
            text in "[a-z ]{0,12}",
        ) {
            let node = render_marks(&TestVocab, &marks, &text);
            let (names, inner) = wrapper_chain(&node);
            let expected: Vec<&'static str> =
                marks.iter().map(|m| TestVocab.mark(m).name).collect();
            prop_assert_eq!(names, expected);
            prop_assert_eq!(inner, text);
        }
    }
}
