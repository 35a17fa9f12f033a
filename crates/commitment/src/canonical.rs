//! Canonical JSON for commitment payloads.
//!
//! The payload is serialized with sorted keys, `", "` between members and
//! `": "` between a key and its value, and every non-ASCII character escaped
//! as `\uXXXX` (UTF-16 surrogate pairs above the BMP):
//!
//! ```text
//! {"embeddingDigest": "<digest>", "salt": "<salt>"}
//! ```
//!
//! This is the byte layout other tooling in the commitment's lifecycle
//! (contract scripts, auditors) reproduces, so it must stay stable.

use serde::Serialize;
use serde_json::ser::Formatter;
use std::collections::BTreeMap;
use std::io;

/// Spaced separators and ASCII-only string output.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct SpacedAsciiFormatter;

impl Formatter for SpacedAsciiFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if fragment.is_ascii() {
            return writer.write_all(fragment.as_bytes());
        }
        let mut units = [0u16; 2];
        for ch in fragment.chars() {
            if ch.is_ascii() {
                writer.write_all(&[ch as u8])?;
            } else {
                for unit in ch.encode_utf16(&mut units) {
                    write!(writer, "\\u{unit:04x}")?;
                }
            }
        }
        Ok(())
    }
}

/// Serialize `{key: value, ...}` with keys sorted and canonical spacing.
pub(crate) fn canonical_json(
    fields: &BTreeMap<&str, &str>,
) -> Result<Vec<u8>, serde_json::Error> {
    let mut out = Vec::with_capacity(128);
    let mut ser = serde_json::Serializer::with_formatter(&mut out, SpacedAsciiFormatter);
    fields.serialize(&mut ser)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(pairs: &[(&'static str, &'static str)]) -> String {
        let map: BTreeMap<&str, &str> = pairs.iter().copied().collect();
        String::from_utf8(canonical_json(&map).unwrap()).unwrap()
    }

    #[test]
    fn keys_are_sorted_with_spaced_separators() {
        assert_eq!(
            render(&[("salt", "00ff"), ("embeddingDigest", "abcd")]),
            r#"{"embeddingDigest": "abcd", "salt": "00ff"}"#
        );
    }

    #[test]
    fn non_ascii_is_escaped() {
        assert_eq!(render(&[("k", "é")]), r#"{"k": "\u00e9"}"#);
        assert_eq!(render(&[("k", "a\u{1F600}b")]), r#"{"k": "a\ud83d\ude00b"}"#);
    }

    #[test]
    fn control_characters_keep_json_escapes() {
        assert_eq!(render(&[("k", "a\"b\n")]), r#"{"k": "a\"b\n"}"#);
    }
}
