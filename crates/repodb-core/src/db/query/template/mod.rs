//! Module: query::template
//! Responsibility: scan declared query text for named `:placeholders`.
//! Does not own: query-language parsing; template bodies are opaque to the engine.
//! Boundary: the compiler checks scanned placeholders against declared parameters.


use derive_more::Display;

///
/// StatementKind
///
/// Leading verb of a declared template, used to keep reads and mutations apart.
///

#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
pub enum StatementKind {
    #[display("select")]
    Select,
    #[display("update")]
    Update,
    #[display("delete")]
    Delete,
    #[display("insert")]
    Insert,
    #[display("other")]
    Other,
}

impl StatementKind {
    #[must_use]
    pub const fn is_mutation(self) -> bool {
        matches!(self, Self::Update | Self::Delete | Self::Insert)
    }
}

///
/// Template
///
/// Declared query text plus the distinct placeholder names it references,
/// in first-appearance order.
///

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Template {
    text: String,
    placeholders: Vec<String>,
    collections: Vec<String>,
}

impl Template {
    /// Scan `text` for `:name` placeholders.
    ///
    /// Quoted literals and `::` casts are skipped; a bare `:` not followed by
    /// an identifier start is left alone.
    #[must_use]
    pub fn scan(text: impl Into<String>) -> Self {
        let text = text.into();
        let (placeholders, collections) = scan_placeholders(&text);

        Self {
            text,
            placeholders,
            collections,
        }
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn placeholders(&self) -> &[String] {
        &self.placeholders
    }

    /// Whether `name` is bound as a collection (`in :name`).
    #[must_use]
    pub fn is_collection(&self, name: &str) -> bool {
        self.collections.iter().any(|c| c == name)
    }

    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    #[must_use]
    pub fn statement_kind(&self) -> StatementKind {
        let head = self
            .text
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();

        match head.as_str() {
            "select" | "from" => StatementKind::Select,
            "update" => StatementKind::Update,
            "delete" => StatementKind::Delete,
            "insert" => StatementKind::Insert,
            _ => StatementKind::Other,
        }
    }
}

fn scan_placeholders(text: &str) -> (Vec<String>, Vec<String>) {
    let bytes = text.as_bytes();
    let mut out: Vec<String> = Vec::new();
    let mut collections: Vec<String> = Vec::new();
    let mut quote: Option<u8> = None;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];

        if let Some(q) = quote {
            if b == q {
                quote = None;
            }
            i += 1;
            continue;
        }

        match b {
            b'\'' | b'"' => quote = Some(b),
            b':' if bytes.get(i + 1) == Some(&b':') => {
                // `::` cast; skip both colons.
                i += 2;
                continue;
            }
            b':' => {
                let start = i + 1;
                let len = bytes[start..]
                    .iter()
                    .enumerate()
                    .take_while(|(n, c)| {
                        c.is_ascii_alphabetic() || **c == b'_' || (*n > 0 && c.is_ascii_digit())
                    })
                    .count();

                if len > 0 {
                    let name = &text[start..start + len];
                    if !out.iter().any(|p| p == name) {
                        out.push(name.to_string());
                    }
                    if follows_in_keyword(&text[..i]) && !collections.iter().any(|c| c == name) {
                        collections.push(name.to_string());
                    }
                    i = start + len;
                    continue;
                }
            }
            _ => {}
        }

        i += 1;
    }

    (out, collections)
}

fn follows_in_keyword(before: &str) -> bool {
    before
        .split(|c: char| c.is_whitespace() || c == '(')
        .rfind(|word| !word.is_empty())
        .is_some_and(|word| word.eq_ignore_ascii_case("in"))
}
