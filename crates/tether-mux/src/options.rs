use std::sync::LazyLock;

use regex::Regex;
use tether_core::events::ChoiceOption;

// Matches "1. Yes", " 2) No", and the highlighted "❯ 1. Yes" form the
// agent's dialog renders for the current selection.
static OPTION_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:❯\s*)?(\d+)[.)]\s+(.+?)\s*$").unwrap());

/// Scrape numbered choice options out of captured pane lines.
///
/// Returns options in the order they appear; the keystroke for each is the
/// literal digit rendered next to it, not its position in the list. Lines
/// that don't look like menu entries are skipped.
pub fn parse_choice_options(lines: &[String]) -> Vec<ChoiceOption> {
    lines
        .iter()
        .filter_map(|line| {
            let caps = OPTION_LINE.captures(line)?;
            Some(ChoiceOption::new(&caps[2], &caps[1]))
        })
        .collect()
}

/// The stock permission dialog the agent shows when nothing better could be
/// scraped from the pane. Keystrokes follow its fixed layout.
pub fn stock_options() -> Vec<ChoiceOption> {
    vec![
        ChoiceOption::new("Yes", "1"),
        ChoiceOption::new("Yes, and don't ask again", "2"),
        ChoiceOption::new("No", "3"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_plain_numbered_menu() {
        let captured = lines(&[
            "Do you want to run this command?",
            "  1. Yes",
            "  2. Yes, and don't ask again for bash commands",
            "  3. No, and tell Claude what to do differently",
        ]);
        let options = parse_choice_options(&captured);
        assert_eq!(options.len(), 3);
        assert_eq!(options[0], ChoiceOption::new("Yes", "1"));
        assert_eq!(options[2].keystroke, "3");
        assert!(options[2].label.starts_with("No"));
    }

    #[test]
    fn highlighted_cursor_row_is_recognized() {
        let captured = lines(&["❯ 1. Yes", "  2. No"]);
        let options = parse_choice_options(&captured);
        assert_eq!(options.len(), 2);
        assert_eq!(options[0], ChoiceOption::new("Yes", "1"));
    }

    #[test]
    fn paren_style_numbering_is_recognized() {
        let captured = lines(&["1) Allow", "2) Deny"]);
        let options = parse_choice_options(&captured);
        assert_eq!(options[0].label, "Allow");
        assert_eq!(options[1].keystroke, "2");
    }

    #[test]
    fn non_menu_lines_are_skipped() {
        let captured = lines(&[
            "Running tests...",
            "3 passed, 0 failed",
            "$ cargo test",
        ]);
        assert!(parse_choice_options(&captured).is_empty());
    }

    #[test]
    fn keystroke_is_the_rendered_digit_not_the_position() {
        let captured = lines(&["  2. Second thing", "  5. Fifth thing"]);
        let options = parse_choice_options(&captured);
        assert_eq!(options[0].keystroke, "2");
        assert_eq!(options[1].keystroke, "5");
    }

    #[test]
    fn stock_options_match_the_fixed_dialog() {
        let options = stock_options();
        assert_eq!(options.len(), 3);
        assert_eq!(options[1].keystroke, "2");
        assert_eq!(options[2], ChoiceOption::new("No", "3"));
    }
}
