//! CSV ingestion with separator auto-detection.
//!
//! The separator is chosen among comma, tab, pipe and semicolon by counting
//! occurrences on the first two lines. Quoting is RFC 4180 style: cells may
//! be quoted with `"`, a doubled `""` escapes a quote, and quoted cells keep
//! their whitespace while unquoted cells are trimmed. The first row is the
//! header; each header becomes a programmatic identifier and a readable
//! label.
use crate::Error;
use crate::field::Field;
use crate::value::Value;

/// Parse CSV text into one raw field per column.
///
/// All values come out as strings (or null for empty unquoted cells);
/// [`Dataset::make`](crate::Dataset::make) applies type conversion.
pub fn read(text: &str) -> Result<Vec<Field>, Error> {
    let table = parse(text)?;
    let Some(header) = table.first() else {
        return Ok(Vec::new());
    };

    let fields = header
        .iter()
        .enumerate()
        .map(|(i, h)| {
            let name = h.as_deref().unwrap_or("");
            let column = table[1..]
                .iter()
                .map(|row| row[i].as_deref().map(Value::str))
                .collect();
            Field::column(&identifier(name), Some(&readable(name)), column)
        })
        .collect();
    Ok(fields)
}

/// Parse CSV text into rows of nullable cells
pub fn parse(text: &str) -> Result<Vec<Vec<Option<String>>>, Error> {
    let separator = find_separator(text);
    log::debug!("csv: separator {:?}", separator);

    let mut lines: Vec<Vec<Option<String>>> = Vec::new();
    let mut line: Vec<Option<String>> = Vec::new();
    let mut building: Option<String> = None;
    let mut in_quote = false;
    let mut was_quoted = false;
    let mut field_count: Option<usize> = None;
    let mut last = ' ';

    // A virtual newline closes the final line
    let mut chars = text.chars().chain(std::iter::once('\n')).peekable();
    while let Some(c) = chars.next() {
        if in_quote {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    building.get_or_insert_with(String::new).push('"');
                } else {
                    in_quote = false;
                }
            } else {
                building.get_or_insert_with(String::new).push(c);
            }
        } else if c == '\n' || c == '\r' {
            // the second of a \r\n pair is skipped
            if last != '\r' || c != '\n' {
                if line.is_empty() && building.as_deref().is_none_or(|b| b.trim().is_empty()) {
                    // an empty line ends the data
                    break;
                }
                line.push(finish_cell(building.take(), was_quoted));
                was_quoted = false;
                match field_count {
                    None => field_count = Some(line.len()),
                    Some(expected) if expected != line.len() => {
                        return Err(Error::Csv {
                            line: lines.len() + 1,
                            reason: format!(
                                "found {} entries, expected {expected}",
                                line.len()
                            ),
                        });
                    }
                    Some(_) => {}
                }
                lines.push(std::mem::take(&mut line));
            }
        } else if c == '"' {
            in_quote = true;
            was_quoted = true;
            building.get_or_insert_with(String::new);
        } else if c == separator {
            line.push(finish_cell(building.take(), was_quoted));
            was_quoted = false;
        } else {
            building.get_or_insert_with(String::new).push(c);
        }
        last = c;
    }
    Ok(lines)
}

fn finish_cell(cell: Option<String>, was_quoted: bool) -> Option<String> {
    if was_quoted {
        cell
    } else {
        cell.map(|s| s.trim().to_string())
    }
}

// Counts on the first two lines decide the separator; a separator whose
// counts disagree between the lines (or is absent) is heavily penalized
fn find_separator(text: &str) -> char {
    let mut best = ',';
    let mut best_score = i64::MIN;
    for candidate in [',', '\t', '|', ';'] {
        let mut counts = [0i64; 2];
        let mut line = 0;
        for c in text.chars().take(5000) {
            if c == candidate {
                counts[line] += 1;
            }
            if c == '\n' {
                line += 1;
                if line >= 2 {
                    break;
                }
            }
        }
        let mut score = counts[0];
        if counts[0] != counts[1] || counts[0] == 0 {
            score -= 10000;
        }
        if score > best_score {
            best = candidate;
            best_score = score;
        }
    }
    best
}

/// The programmatic form of a header: parenthetical trailer stripped,
/// non-alphanumeric runs collapsed to `_`, a leading digit prefixed with `_`
pub fn identifier(text: &str) -> String {
    let text = match text.find('(') {
        Some(p) if p > 0 => text[..p].trim(),
        _ => text,
    };

    let mut result = String::new();
    let mut last_underscore = false;
    for (i, c) in text.chars().enumerate() {
        if c.is_ascii_digit() {
            if i == 0 {
                result.push('_');
            }
            result.push(c);
            last_underscore = false;
        } else if c == '_' || c.is_ascii_alphabetic() {
            if result == "_" && i > 0 {
                // drop a leading underscore that came from punctuation
                result.clear();
            }
            result.push(c);
            last_underscore = false;
        } else if !last_underscore {
            result.push('_');
            last_underscore = true;
        }
    }
    if result.is_empty() {
        result.push('_');
    }
    result
}

/// The human-readable form of a header: underscores become spaces, words
/// are capitalized, and camelCase splits at the case change
pub fn readable(text: &str) -> String {
    let mut built = String::new();
    let mut last = ' ';
    let mut last_lower = false;
    for c in text.chars() {
        let c = if c == '_' { ' ' } else { c };
        if c == ' ' {
            if last != ' ' {
                built.push(c);
            }
        } else if c.is_lowercase() {
            if last == ' ' {
                built.extend(c.to_uppercase());
            } else {
                built.push(c);
            }
        } else {
            if last_lower && (c.is_uppercase() || c.is_ascii_digit()) {
                built.push(' ');
            }
            built.push(c);
        }
        last_lower = c.is_lowercase();
        last = c;
    }
    built
}
