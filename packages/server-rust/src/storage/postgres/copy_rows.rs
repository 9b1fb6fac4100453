//! CSV payload for `COPY records (...) FROM STDIN WITH (FORMAT csv)`.
//!
//! Every field is quoted, so an empty string never reads back as NULL. The
//! `tags` column is a `TEXT[]`, written as an array literal whose elements are
//! always double-quoted; that literal is then CSV-quoted like any other field.

use csv::{QuoteStyle, WriterBuilder};
use recordline_core::validation::BIRTH_DATE_FORMAT;
use recordline_core::Record;

use crate::storage::StorageError;

/// Encodes `records` as CSV rows in the column order of
/// [`COLUMNS`](super::COLUMNS).
///
/// # Errors
///
/// Returns [`StorageError::Rejected`] if a row cannot be encoded.
pub(super) fn encode_rows(records: &[Record]) -> Result<Vec<u8>, StorageError> {
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .quote_style(QuoteStyle::Always)
        .from_writer(Vec::with_capacity(records.len() * 128));

    for record in records {
        writer
            .write_record([
                record.id.to_string(),
                record.name.clone(),
                record.nickname.clone(),
                record.birth_date.format(BIRTH_DATE_FORMAT).to_string(),
                array_literal(&record.tags),
                record.search_text(),
            ])
            .map_err(encode_error)?;
    }
    writer
        .into_inner()
        .map_err(|e| encode_error(e.into_error()))
}

fn encode_error(err: impl std::fmt::Display) -> StorageError {
    StorageError::Rejected(format!("COPY payload encoding failed: {err}"))
}

/// `PostgreSQL` array literal with every element quoted and escaped.
fn array_literal(items: &[String]) -> String {
    let mut out = String::from("{");
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push('"');
        for c in item.chars() {
            if c == '"' || c == '\\' {
                out.push('\\');
            }
            out.push(c);
        }
        out.push('"');
    }
    out.push('}');
    out
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::test_support::record;

    /// Inverse of `array_literal`, only for the shapes it produces.
    fn parse_array_literal(literal: &str) -> Vec<String> {
        let inner = &literal[1..literal.len() - 1];
        let mut items = Vec::new();
        let mut chars = inner.chars();
        while let Some(c) = chars.next() {
            if c != '"' {
                continue;
            }
            let mut item = String::new();
            while let Some(c) = chars.next() {
                match c {
                    '\\' => item.extend(chars.next()),
                    '"' => break,
                    other => item.push(other),
                }
            }
            items.push(item);
        }
        items
    }

    #[test]
    fn empty_tags_encode_as_empty_array() {
        assert_eq!(array_literal(&[]), "{}");
    }

    #[test]
    fn array_elements_are_quoted_and_escaped() {
        let tags = vec![
            "plain".to_string(),
            "with,comma".to_string(),
            "say \"hi\"".to_string(),
            "back\\slash".to_string(),
            "{braces}".to_string(),
        ];
        assert_eq!(
            array_literal(&tags),
            r#"{"plain","with,comma","say \"hi\"","back\\slash","{braces}"}"#
        );
    }

    fn read_back(payload: &[u8]) -> Vec<Vec<String>> {
        csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(payload)
            .records()
            .map(|row| row.unwrap().iter().map(str::to_string).collect())
            .collect()
    }

    #[test]
    fn embedded_quotes_are_doubled() {
        let mut rec = record("ada");
        rec.name = r#"a "quoted" name"#.to_string();
        let payload = String::from_utf8(encode_rows(std::slice::from_ref(&rec)).unwrap()).unwrap();
        assert!(payload.contains(r#""a ""quoted"" name""#));
    }

    #[test]
    fn row_has_six_quoted_fields_and_newline() {
        let rec = record("ada");
        let row = String::from_utf8(encode_rows(std::slice::from_ref(&rec)).unwrap()).unwrap();
        let expected = format!(
            "\"{}\",\"ada\",\"ada-nick\",\"1990-05-17\",\"{{\"\"rust\"\",\"\"postgres\"\"}}\",\"ada ada-nick rust postgres\"\n",
            rec.id
        );
        assert_eq!(row, expected);
    }

    #[test]
    fn one_line_per_record() {
        let records: Vec<_> = (0..3).map(|i| record(&format!("r{i}"))).collect();
        assert_eq!(read_back(&encode_rows(&records).unwrap()).len(), 3);
    }

    #[test]
    fn fields_survive_commas_and_newlines() {
        let mut rec = record("ada");
        rec.name = "Lovelace, Ada".to_string();
        rec.nickname = "two\nlines".to_string();
        rec.tags = vec!["with,comma".to_string()];

        let rows = read_back(&encode_rows(std::slice::from_ref(&rec)).unwrap());

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], rec.id.to_string());
        assert_eq!(rows[0][1], "Lovelace, Ada");
        assert_eq!(rows[0][2], "two\nlines");
        assert_eq!(parse_array_literal(&rows[0][4]), rec.tags);
    }

    proptest! {
        #[test]
        fn array_literal_preserves_elements(tags in proptest::collection::vec("[^\u{0}]{0,12}", 0..6)) {
            prop_assert_eq!(parse_array_literal(&array_literal(&tags)), tags);
        }

        #[test]
        fn names_round_trip_through_csv(name in "[^\u{0}]{1,40}") {
            let mut rec = record("ada");
            rec.name = name.clone();
            let rows = read_back(&encode_rows(std::slice::from_ref(&rec)).unwrap());
            prop_assert_eq!(&rows[0][1], &name);
        }
    }
}
