//! Name extraction for the "await name" stages

/// Use the whole message as the name: strip surrounding quotes and
/// whitespace, capitalize each word and join with single spaces.
///
/// An empty result means no name was given.
pub fn extract_name(text: &str) -> String {
    text.trim_matches(|c: char| c == '"' || c == '\'' || c.is_whitespace())
        .split_whitespace()
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quoted_name_is_cleaned() {
        assert_eq!(extract_name("  \"john doe\"  "), "John Doe");
    }

    #[test]
    fn test_empty_and_quote_only_inputs() {
        assert_eq!(extract_name(""), "");
        assert_eq!(extract_name("   "), "");
        assert_eq!(extract_name("' \" '"), "");
    }

    #[test]
    fn test_inner_whitespace_collapses() {
        assert_eq!(extract_name("maria\t  da   SILVA"), "Maria Da Silva");
    }

    #[test]
    fn test_non_ascii_letters() {
        assert_eq!(extract_name("'élodie ângela'"), "Élodie Ângela");
    }
}
