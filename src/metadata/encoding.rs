//! Repair of mis-decoded tag text.
//!
//! Some taggers write GBK bytes into fields declared as Latin-1, so readers
//! hand back mojibake full of control characters and U+FFFD. Mapping each
//! char back to its byte and decoding as GBK recovers the original text.

use encoding_rs::GBK;

/// Whether a string shows signs of broken decoding.
///
/// Tab, newline and carriage return are legitimate; other C0 controls,
/// DEL and the replacement character are not.
pub fn is_garbled(s: &str) -> bool {
    s.chars().any(|c| {
        matches!(
            c,
            '\u{0}'..='\u{8}' | '\u{b}' | '\u{c}' | '\u{e}'..='\u{1f}' | '\u{7f}' | '\u{fffd}'
        )
    })
}

/// Try to recover GBK text from a garbled string.
///
/// Returns the input unchanged when it is not garbled or when the GBK
/// reading is empty or still garbled.
pub fn fix_encoding(s: &str) -> String {
    if s.is_empty() || !is_garbled(s) {
        return s.to_string();
    }

    // Latin-1 reading: each char keeps only its low byte, so U+FFFD
    // becomes 0xFD and stays garbled unless it really was a GBK lead byte
    let bytes: Vec<u8> = s.chars().map(|c| (u32::from(c) & 0xFF) as u8).collect();

    let (decoded, _, _) = GBK.decode(&bytes);
    if !decoded.is_empty() && !is_garbled(&decoded) && !has_private_use(&decoded) {
        tracing::debug!(target: "metadata::encoding", from = s, to = %decoded, "Repaired tag encoding");
        return decoded.into_owned();
    }

    s.to_string()
}

/// GBK's user-defined rows decode to the Private Use Area, which no real
/// tag text contains.
fn has_private_use(s: &str) -> bool {
    s.chars().any(|c| matches!(c, '\u{e000}'..='\u{f8ff}'))
}
