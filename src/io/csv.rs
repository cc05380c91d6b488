//! Minimal CSV line handling.
//!
//! Measurement exports and the unified table are plain comma-separated
//! text. Fields may be double-quoted; a doubled quote inside a quoted field
//! is a literal quote.

/// Split one CSV line into fields.
pub fn split_fields(line: &str) -> Vec<String> {
    let line = line.strip_prefix('\u{feff}').unwrap_or(line);
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    field.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            }
            '"' if field.trim().is_empty() => {
                field.clear();
                in_quotes = true;
            }
            ',' if !in_quotes => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    fields.push(field);

    fields.into_iter().map(|f| f.trim().to_string()).collect()
}

/// Quote a field if it contains a separator, quote or line break.
pub fn escape_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Join fields into one CSV line (no terminator).
pub fn join_fields<S: AsRef<str>>(fields: &[S]) -> String {
    fields
        .iter()
        .map(|f| escape_field(f.as_ref()))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_plain() {
        assert_eq!(
            split_fields("R_1_C_2,150.5,10,20"),
            vec!["R_1_C_2", "150.5", "10", "20"]
        );
    }

    #[test]
    fn test_split_quoted_and_bom() {
        assert_eq!(
            split_fields("\u{feff}\"a,b\", \"say \"\"hi\"\"\" ,"),
            vec!["a,b", "say \"hi\"", ""]
        );
    }

    #[test]
    fn test_join_escapes() {
        let line = join_fields(&["Gap, Run", "plain", "q\"uote"]);
        assert_eq!(line, "\"Gap, Run\",plain,\"q\"\"uote\"");
        assert_eq!(split_fields(&line), vec!["Gap, Run", "plain", "q\"uote"]);
    }
}
