//! Identifier escaping.
//!
//! Column and table names are wrapped in backticks after any embedded backtick
//! is stripped. A fragment containing a space or a parenthesis is a raw
//! expression (`COUNT(*)`, `a.price * a.qty`) and passes through untouched.

/// True when the fragment must be passed through unescaped.
pub fn is_raw_expression(fragment: &str) -> bool {
    fragment.contains(' ') || fragment.contains('(')
}

fn quote(ident: &str) -> String {
    format!("`{}`", ident)
}

/// Escape a column reference: `col`, `table.col`, `table.*` or `*`.
pub fn escape_field(field: &str) -> String {
    let field = field.trim();
    if is_raw_expression(field) {
        return field.to_string();
    }
    let field = field.replace('`', "");
    match field.split_once('.') {
        Some((table, "*")) => format!("{}.*", quote(table)),
        Some((table, column)) => format!("{}.{}", quote(table), quote(column)),
        None if field == "*" => field,
        None => quote(&field),
    }
}

/// Escape a table reference: `name`, `db.name`, `name alias` or `name AS alias`.
///
/// Anything with a parenthesis (derived tables) is passed through raw.
pub fn escape_table(table: &str) -> String {
    let table = table.trim();
    if table.contains('(') {
        return table.to_string();
    }
    let table = table.replace('`', "");
    let parts: Vec<&str> = table.split_whitespace().collect();
    match parts.as_slice() {
        [name] => escape_table_name(name),
        [name, alias] => format!("{} {}", escape_table_name(name), quote(alias)),
        [name, kw, alias] if kw.eq_ignore_ascii_case("as") => {
            format!("{} {}", escape_table_name(name), quote(alias))
        }
        _ => table.to_string(),
    }
}

fn escape_table_name(name: &str) -> String {
    match name.split_once('.') {
        Some((db, table)) => format!("{}.{}", quote(db), quote(table)),
        None => quote(name),
    }
}

/// Split on `sep` outside of parentheses and quotes, trimming each piece and
/// dropping empty ones.
pub fn split_top_level(input: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote_char: Option<char> = None;
    let mut current = String::new();

    for ch in input.chars() {
        match quote_char {
            Some(q) if ch == q => quote_char = None,
            Some(_) => {}
            None => match ch {
                '\'' | '"' | '`' => quote_char = Some(ch),
                '(' => depth += 1,
                ')' => depth = depth.saturating_sub(1),
                c if c == sep && depth == 0 => {
                    push_trimmed(&mut parts, &current);
                    current.clear();
                    continue;
                }
                _ => {}
            },
        }
        current.push(ch);
    }
    push_trimmed(&mut parts, &current);
    parts
}

fn push_trimmed(parts: &mut Vec<String>, piece: &str) {
    let piece = piece.trim();
    if !piece.is_empty() {
        parts.push(piece.to_string());
    }
}
