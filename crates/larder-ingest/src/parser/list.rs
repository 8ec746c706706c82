//! List-shaped text blocks
//!
//! Recipe exports store ingredient and instruction lists either as a
//! bracketed list of quoted strings (`['1 cup flour', "2 eggs"]`) or as one
//! item per line.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ListError {
    #[error("expected a bracketed list or one item per line")]
    NotListShaped,

    #[error("unterminated list")]
    Unterminated,

    #[error("unquoted list item at offset {0}")]
    UnquotedItem(usize),

    #[error("expected ',' or ']' at offset {0}")]
    MissingSeparator(usize),
}

/// Split a list-shaped block into trimmed, non-empty items
///
/// A blank block is an empty list. A single line that is not bracketed is
/// rejected.
pub fn parse_list_block(block: &str) -> Result<Vec<String>, ListError> {
    let trimmed = block.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    if trimmed.starts_with('[') {
        return parse_bracketed(trimmed);
    }
    if trimmed.contains('\n') {
        return Ok(trimmed
            .lines()
            .map(strip_bullet)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect());
    }
    Err(ListError::NotListShaped)
}

fn strip_bullet(line: &str) -> &str {
    let line = line.trim();
    for bullet in ["- ", "* ", "• "] {
        if let Some(rest) = line.strip_prefix(bullet) {
            return rest.trim();
        }
    }
    line
}

fn parse_bracketed(text: &str) -> Result<Vec<String>, ListError> {
    let inner = text
        .strip_prefix('[')
        .and_then(|t| t.strip_suffix(']'))
        .ok_or(ListError::Unterminated)?;

    let mut items = Vec::new();
    let mut chars = inner.char_indices().peekable();

    loop {
        while chars.next_if(|(_, c)| c.is_whitespace()).is_some() {}

        let Some((offset, quote)) = chars.next() else {
            break;
        };
        if quote != '\'' && quote != '"' {
            return Err(ListError::UnquotedItem(offset + 1));
        }

        let mut item = String::new();
        let mut closed = false;
        while let Some((_, c)) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some((_, 'n')) => item.push('\n'),
                    Some((_, 't')) => item.push('\t'),
                    Some((_, escaped)) => item.push(escaped),
                    None => return Err(ListError::Unterminated),
                },
                c if c == quote => {
                    closed = true;
                    break;
                },
                c => item.push(c),
            }
        }
        if !closed {
            return Err(ListError::Unterminated);
        }

        let item = item.trim();
        if !item.is_empty() {
            items.push(item.to_string());
        }

        while chars.next_if(|(_, c)| c.is_whitespace()).is_some() {}
        match chars.next() {
            None => break,
            Some((_, ',')) => continue,
            Some((offset, _)) => return Err(ListError::MissingSeparator(offset + 1)),
        }
    }

    Ok(items)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_bracketed_single_and_double_quotes() {
        let items = parse_list_block(r#"['1 cup flour', "2 eggs", 'a pinch of salt']"#).unwrap();
        assert_eq!(items, vec!["1 cup flour", "2 eggs", "a pinch of salt"]);
    }

    #[test]
    fn test_escaped_quotes_and_trailing_comma() {
        let items = parse_list_block(r#"['baker\'s chocolate', "6\" tortillas",]"#).unwrap();
        assert_eq!(items, vec!["baker's chocolate", "6\" tortillas"]);
    }

    #[test]
    fn test_empty_inputs() {
        assert!(parse_list_block("").unwrap().is_empty());
        assert!(parse_list_block("   ").unwrap().is_empty());
        assert!(parse_list_block("[]").unwrap().is_empty());
        assert!(parse_list_block("['', '  ']").unwrap().is_empty());
    }

    #[test]
    fn test_multi_line_block() {
        let items = parse_list_block("- 2 cups flour\n\n* 1 tsp salt\n3 eggs\n").unwrap();
        assert_eq!(items, vec!["2 cups flour", "1 tsp salt", "3 eggs"]);
    }

    #[test]
    fn test_malformed_blocks() {
        assert_eq!(parse_list_block("{not a list"), Err(ListError::NotListShaped));
        assert_eq!(parse_list_block("2 cups flour"), Err(ListError::NotListShaped));
        assert_eq!(parse_list_block("['flour'"), Err(ListError::Unterminated));
        assert_eq!(parse_list_block("['flour]"), Err(ListError::Unterminated));
        assert!(matches!(parse_list_block("[flour, sugar]"), Err(ListError::UnquotedItem(_))));
        assert!(matches!(
            parse_list_block("['flour' 'sugar']"),
            Err(ListError::MissingSeparator(_))
        ));
    }
}
