//! Decoding of list literals written by hand into configuration cells.
//!
//! Operators write lists either as JSON (`["a", "b"]`) or with single quotes (`['a', 'b']`),
//! occasionally as tuples (`('a', 'b')`) or with bare numbers (`[202301, 202302]`).

/// Parse a list literal into its items as strings.
///
/// Returns `None` when `raw` is not a well-formed list literal.
pub fn parse_literal_list(raw: &str) -> Option<Vec<String>> {
    let raw = raw.trim();
    if let Ok(serde_json::Value::Array(items)) = serde_json::from_str::<serde_json::Value>(raw) {
        return items.into_iter().map(json_scalar_to_string).collect();
    }

    let inner = raw
        .strip_prefix('[')
        .and_then(|r| r.strip_suffix(']'))
        .or_else(|| raw.strip_prefix('(').and_then(|r| r.strip_suffix(')')))?;

    let mut items = Vec::new();
    let mut chars = inner.chars().peekable();
    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        match chars.next() {
            None => break,
            Some(quote @ ('\'' | '"')) => {
                let mut item = String::new();
                loop {
                    match chars.next()? {
                        '\\' => item.push(chars.next()?),
                        c if c == quote => break,
                        c => item.push(c),
                    }
                }
                items.push(item);
            }
            Some(first) => {
                let mut item = String::from(first);
                while let Some(&c) = chars.peek() {
                    if c == ',' {
                        break;
                    }
                    item.push(c);
                    chars.next();
                }
                let item = item.trim();
                item.parse::<f64>().ok()?;
                items.push(item.to_string());
            }
        }
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        match chars.next() {
            None => break,
            Some(',') => continue,
            Some(_) => return None,
        }
    }
    Some(items)
}

fn json_scalar_to_string(v: serde_json::Value) -> Option<String> {
    match v {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_and_double_quotes() {
        assert_eq!(
            parse_literal_list("['Код', \"Name\", 'it\\'s']"),
            Some(vec!["Код".to_string(), "Name".to_string(), "it's".to_string()])
        );
    }

    #[test]
    fn json_numbers_tuples_and_trailing_comma() {
        assert_eq!(
            parse_literal_list("[202301, 202302]"),
            Some(vec!["202301".to_string(), "202302".to_string()])
        );
        assert_eq!(parse_literal_list("('a',)"), Some(vec!["a".to_string()]));
        assert_eq!(parse_literal_list("[]"), Some(vec![]));
    }

    #[test]
    fn rejects_non_lists() {
        assert_eq!(parse_literal_list("Лист1"), None);
        assert_eq!(parse_literal_list("A:C"), None);
        assert_eq!(parse_literal_list("['a' 'b']"), None);
        assert_eq!(parse_literal_list("[abc]"), None);
        assert_eq!(parse_literal_list("['unterminated]"), None);
    }
}
