//! Spec id generation: `NNN-slug`, a monotonically increasing zero-padded
//! counter joined to a slugified title. Stable for a task's lifetime.

/// Slugify a title for use in a spec id.
pub fn slugify(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .filter_map(|c| {
            if c.is_alphanumeric() {
                Some(c)
            } else if c == '\'' || c == '\u{2019}' || c == '\u{2018}' {
                None
            } else {
                Some('-')
            }
        })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Build a spec id of the form `NNN-slug` from a counter value and title.
/// The counter is zero-padded to at least 3 digits but grows past that
/// without truncation once a project passes 999 tasks.
pub fn spec_id(counter: u32, title: &str) -> String {
    format!("{:03}-{}", counter, slugify(title))
}

/// Extract the numeric counter prefix from a spec id, if well-formed.
pub fn counter_of(spec_id: &str) -> Option<u32> {
    spec_id.split('-').next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_strips_punctuation_and_apostrophes() {
        assert_eq!(slugify("Add OAuth Login"), "add-oauth-login");
        assert_eq!(slugify("Don't stop"), "dont-stop");
        assert_eq!(slugify("Multiple   Spaces"), "multiple-spaces");
    }

    #[test]
    fn spec_id_pads_counter_to_three_digits() {
        assert_eq!(spec_id(1, "Add login"), "001-add-login");
        assert_eq!(spec_id(42, "Fix bug"), "042-fix-bug");
        assert_eq!(spec_id(1234, "Big project"), "1234-big-project");
    }

    #[test]
    fn counter_of_parses_the_prefix() {
        assert_eq!(counter_of("007-add-login"), Some(7));
        assert_eq!(counter_of("not-an-id"), None);
    }
}
