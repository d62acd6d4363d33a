//! Identifier encoding for data variables
//!
//! Variable names are user text ("Collection Item") and data source ids
//! contain `-`; neither is a valid identifier as-is. Both encodings below
//! produce identifiers the lexer accepts and can be reversed.

/// Prefix marking an identifier as a reference to a data source id
pub const DATA_SOURCE_ID_PREFIX: &str = "$ws$dataSource$";

const DASH_MARKER: &str = "__DASH__";

/// Encode a variable name as an identifier
///
/// ASCII letters and `_` pass through; every other character (digits and
/// `$` included) becomes `$<code point>$`, so decoding never guesses.
pub fn encode_data_variable_name(name: &str) -> String {
    let mut encoded = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphabetic() || c == '_' {
            encoded.push(c);
        } else {
            encoded.push('$');
            encoded.push_str(&(c as u32).to_string());
            encoded.push('$');
        }
    }
    encoded
}

/// Reverse of [`encode_data_variable_name`]
///
/// A `$` that does not start a valid `$<code point>$` sequence is kept.
pub fn decode_data_variable_name(identifier: &str) -> String {
    let mut decoded = String::with_capacity(identifier.len());
    let mut rest = identifier;

    while let Some(index) = rest.find('$') {
        decoded.push_str(&rest[..index]);
        let after = &rest[index + 1..];

        let digits = after.bytes().take_while(u8::is_ascii_digit).count();
        let escaped = (digits > 0 && after[digits..].starts_with('$'))
            .then(|| after[..digits].parse::<u32>().ok().and_then(char::from_u32))
            .flatten();

        match escaped {
            Some(c) => {
                decoded.push(c);
                rest = &after[digits + 1..];
            }
            None => {
                decoded.push('$');
                rest = after;
            }
        }
    }

    decoded.push_str(rest);
    decoded
}

/// Encode a data source id as an identifier
///
/// `_` is escaped so the only `_` in the output belong to dash markers.
pub fn encode_data_variable_id(id: &str) -> String {
    let mut encoded = String::from(DATA_SOURCE_ID_PREFIX);
    for c in id.chars() {
        match c {
            '-' => encoded.push_str(DASH_MARKER),
            c if c.is_ascii_alphanumeric() => encoded.push(c),
            c => {
                encoded.push('$');
                encoded.push_str(&(c as u32).to_string());
                encoded.push('$');
            }
        }
    }
    encoded
}

/// Data source id referenced by an identifier, if it is an encoded id
pub fn decode_data_variable_id(identifier: &str) -> Option<String> {
    let encoded = identifier.strip_prefix(DATA_SOURCE_ID_PREFIX)?;
    if encoded.is_empty() {
        return None;
    }
    Some(decode_data_variable_name(&encoded.replace(DASH_MARKER, "-")))
}

pub fn is_data_variable_id(identifier: &str) -> bool {
    identifier.starts_with(DATA_SOURCE_ID_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_name_with_space() {
        assert_eq!(encode_data_variable_name("Collection Item"), "Collection$32$Item");
        assert_eq!(decode_data_variable_name("Collection$32$Item"), "Collection Item");
    }

    #[test]
    fn test_name_roundtrip_with_digits_and_dollars() {
        for name in ["item1", "$price", "a$32$b", "über", "x-y", "1$"] {
            let encoded = encode_data_variable_name(name);
            assert!(encoded
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$'));
            assert_eq!(decode_data_variable_name(&encoded), name);
        }
    }

    #[test]
    fn test_decode_keeps_stray_dollars() {
        assert_eq!(decode_data_variable_name("a$b"), "a$b");
        assert_eq!(decode_data_variable_name("a$12"), "a$12");
    }

    #[test]
    fn test_id_roundtrip() {
        let encoded = encode_data_variable_id("abc-12");
        assert_eq!(encoded, "$ws$dataSource$abc__DASH__12");
        assert_eq!(decode_data_variable_id(&encoded).as_deref(), Some("abc-12"));
        assert_eq!(decode_data_variable_id("myVariable"), None);
    }

    #[test]
    fn test_id_with_literal_dash_marker() {
        let encoded = encode_data_variable_id("a__DASH__b");
        assert_eq!(encoded, "$ws$dataSource$a$95$$95$DASH$95$$95$b");
        assert_ne!(encoded, encode_data_variable_id("a-b"));
        assert_eq!(decode_data_variable_id(&encoded).as_deref(), Some("a__DASH__b"));
    }

    #[test]
    fn test_id_roundtrip_with_underscores_and_dashes() {
        for id in ["snake_case", "_-_", "a_-b", "x--y__", "é-1"] {
            let encoded = encode_data_variable_id(id);
            assert_eq!(decode_data_variable_id(&encoded).as_deref(), Some(id));
        }
    }
}
