//! Minimal CSV reader: quoted fields, doubled-quote escapes, CRLF.
//!
//! Good enough for Active.com result downloads and club rosters; a stray
//! unterminated quote swallows the rest of the input instead of failing.

use std::mem::take;

/// Split `text` into rows of fields. Blank lines are dropped.
pub fn parse_rows(text: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.trim_start_matches('\u{feff}').chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' if field.trim().is_empty() => {
                field.clear();
                in_quotes = true;
            }
            ',' if !in_quotes => row.push(take(&mut field)),
            '\r' | '\n' if !in_quotes => {
                if ch == '\r' && chars.peek() == Some(&'\n') {
                    chars.next();
                }
                row.push(take(&mut field));
                push_row(&mut rows, take(&mut row));
            }
            _ => field.push(ch),
        }
    }

    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        push_row(&mut rows, row);
    }
    rows
}

fn push_row(rows: &mut Vec<Vec<String>>, row: Vec<String>) {
    if row.iter().any(|f| !f.trim().is_empty()) {
        rows.push(row);
    }
}

/// Heuristic used to tell a CSV download from an HTML page.
pub fn looks_like_csv(text: &str) -> bool {
    let head = text.trim_start();
    if head.starts_with('<') {
        return false;
    }
    head.lines()
        .next()
        .map(|first| first.contains(','))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_rows() {
        let rows = parse_rows("LAST,FIRST,DOB\nDoe,Jane,1967-12-1\n");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], vec!["Doe", "Jane", "1967-12-1"]);
    }

    #[test]
    fn test_quotes_and_crlf() {
        let rows = parse_rows("1,\"Smith, Joe\",\"say \"\"hi\"\"\"\r\n\r\n2,Ann Lee,x");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], vec!["1", "Smith, Joe", "say \"hi\""]);
        assert_eq!(rows[1], vec!["2", "Ann Lee", "x"]);
    }

    #[test]
    fn test_trailing_row_without_newline_and_bom() {
        let rows = parse_rows("\u{feff}a,b\nc,");
        assert_eq!(rows, vec![vec!["a", "b"], vec!["c", ""]]);
    }

    #[test]
    fn test_looks_like_csv() {
        assert!(looks_like_csv("Place,Bib,Name\n1,2,Jo"));
        assert!(!looks_like_csv("<html><body>a,b</body></html>"));
        assert!(!looks_like_csv(""));
    }
}
