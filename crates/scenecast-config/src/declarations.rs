//! Style-attribute declaration parsing (`key: value; key: value`).

/// Splits an inline declaration string into trimmed `(key, value)` pairs.
///
/// Declarations are separated by `;` and split at their first `:`, so values
/// may themselves contain colons (URLs, for instance). Empty declarations
/// and declarations with an empty key are skipped. A declaration without a
/// colon yields an empty value.
pub fn parse_declarations(input: &str) -> Vec<(String, String)> {
    input
        .split(';')
        .filter_map(|declaration| {
            let declaration = declaration.trim();
            if declaration.is_empty() {
                return None;
            }
            let (key, value) = declaration.split_once(':').unwrap_or((declaration, ""));
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), value.trim().to_string()))
        })
        .collect()
}
