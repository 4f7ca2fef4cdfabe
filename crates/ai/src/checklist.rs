//! Checklist text parsing.

/// Leading markers a model may put in front of checklist items.
const BULLET_MARKERS: [char; 3] = ['-', '•', '*'];

/// Turn raw checklist text into ordered items.
///
/// Each line has its leading bullet markers and surrounding whitespace removed;
/// lines that end up empty are dropped. Line order is preserved.
pub fn parse_checklist(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| {
            line.trim_start_matches(|c: char| BULLET_MARKERS.contains(&c) || c.is_whitespace())
                .trim_end()
        })
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn strips_mixed_markers_and_blank_lines() {
        assert_eq!(
            parse_checklist("- A\n* B\n•  C\n\nD"),
            vec!["A", "B", "C", "D"]
        );
    }

    #[test]
    fn handles_crlf_and_indentation() {
        assert_eq!(
            parse_checklist("  - First step\r\n\t* Second step  \r\n"),
            vec!["First step", "Second step"]
        );
    }

    #[test]
    fn marker_only_lines_are_dropped() {
        assert_eq!(parse_checklist("-\n*  \n•\n- real"), vec!["real"]);
    }

    #[test]
    fn empty_input_yields_no_items() {
        assert!(parse_checklist("").is_empty());
        assert!(parse_checklist("\n \n").is_empty());
    }

    #[test]
    fn inner_markers_are_kept() {
        assert_eq!(
            parse_checklist("- check blood-pressure * twice"),
            vec!["check blood-pressure * twice"]
        );
    }

    fn bullet() -> impl Strategy<Value = &'static str> {
        prop::sample::select(vec!["", "- ", "* ", "• ", "  -  ", "\t*"])
    }

    proptest! {
        #[test]
        fn bulleted_items_round_trip(
            items in prop::collection::vec("[A-Za-z0-9][A-Za-z0-9,.]{0,20}", 1..10),
            bullets in prop::collection::vec(bullet(), 10),
            blanks in prop::collection::vec(any::<bool>(), 10),
        ) {
            let mut text = String::new();
            for (i, item) in items.iter().enumerate() {
                if blanks[i] {
                    text.push_str("\n  \n");
                }
                text.push_str(bullets[i]);
                text.push_str(item);
                text.push('\n');
            }

            prop_assert_eq!(parse_checklist(&text), items);
        }

        #[test]
        fn items_are_never_blank_or_marker_prefixed(text in "[-*• a-z\n]{0,80}") {
            for item in parse_checklist(&text) {
                prop_assert!(!item.trim().is_empty());
                prop_assert!(!item.starts_with(|c: char| BULLET_MARKERS.contains(&c) || c.is_whitespace()));
                prop_assert!(!item.ends_with(char::is_whitespace));
            }
        }
    }
}
