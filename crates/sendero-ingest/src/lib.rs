// SPDX-FileCopyrightText: 2026 Sendero Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Contact file ingestion for the Sendero campaign pipeline.
//!
//! Parses an untrusted tabular file (comma or semicolon delimited, first row
//! = header) into normalized [`Contact`] records. Column names are matched
//! against common synonyms case- and diacritic-insensitively; the required
//! logical columns are `name` and `phone`, every other column becomes a
//! template-variable candidate.
//!
//! Invalid rows are collected with their 1-based row index and reason,
//! never silently dropped.

use std::collections::BTreeMap;

use sendero_core::{Contact, SenderoError, is_valid_phone};
use tracing::debug;

/// Header synonyms accepted for the logical `name` column.
const NAME_SYNONYMS: &[&str] = &[
    "name", "nombre", "nombres", "fullname", "full name", "full_name", "contact", "cliente",
];

/// Header synonyms accepted for the logical `phone` column.
const PHONE_SYNONYMS: &[&str] = &[
    "phone",
    "telefono",
    "tel",
    "celular",
    "movil",
    "mobile",
    "number",
    "numero",
    "phone number",
    "phone_number",
    "whatsapp",
];

/// A rejected row with its 1-based data-row index and reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowError {
    pub row: usize,
    pub reason: String,
}

/// Outcome of ingesting a contact file: the valid contacts plus every
/// per-row rejection.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub contacts: Vec<Contact>,
    pub errors: Vec<RowError>,
}

/// Parse and validate an uploaded contact file.
///
/// `default_country_code` is prefixed to bare 10-digit local numbers.
///
/// Fails with [`SenderoError::Validation`] when a required column is missing
/// entirely, and with [`SenderoError::EmptyInput`] when zero valid contacts
/// remain after validation — a campaign cannot be created with zero sendable
/// contacts.
pub fn ingest(raw: &[u8], default_country_code: &str) -> Result<IngestReport, SenderoError> {
    let delimiter = detect_delimiter(raw);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(strip_bom(raw));

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| SenderoError::Validation(format!("unreadable header row: {e}")))?
        .iter()
        .map(normalize_header)
        .collect();

    let columns = map_columns(&headers)?;

    let mut contacts = Vec::new();
    let mut errors = Vec::new();

    for (idx, record) in reader.records().enumerate() {
        let row = idx + 1;
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                errors.push(RowError {
                    row,
                    reason: format!("unparseable row: {e}"),
                });
                continue;
            }
        };

        let field = |i: usize| record.get(i).unwrap_or("").trim();

        let name = field(columns.name);
        if name.is_empty() {
            errors.push(RowError {
                row,
                reason: "missing name".to_string(),
            });
            continue;
        }

        let phone = match normalize_phone(field(columns.phone), default_country_code) {
            Ok(p) => p,
            Err(reason) => {
                errors.push(RowError { row, reason });
                continue;
            }
        };

        let mut extra = BTreeMap::new();
        for (i, header) in headers.iter().enumerate() {
            if i == columns.name || i == columns.phone {
                continue;
            }
            extra.insert(header.clone(), field(i).to_string());
        }

        contacts.push(Contact {
            name: name.to_string(),
            phone,
            extra,
        });
    }

    debug!(
        valid = contacts.len(),
        rejected = errors.len(),
        "contact file ingested"
    );

    if contacts.is_empty() {
        return Err(SenderoError::EmptyInput);
    }

    Ok(IngestReport { contacts, errors })
}

/// Normalize a raw phone value to `+<countrycode><number>`.
///
/// Strips non-digits, requires at least 10 digits, prefixes bare 10-digit
/// local numbers with the default country code, and rejects anything that
/// exceeds 15 digits after normalization.
pub fn normalize_phone(raw: &str, default_country_code: &str) -> Result<String, String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    if digits.len() < 10 {
        return Err(format!("invalid phone `{raw}`: fewer than 10 digits"));
    }

    let full = if digits.len() == 10 {
        format!("{default_country_code}{digits}")
    } else {
        digits
    };

    let normalized = format!("+{full}");
    if !is_valid_phone(&normalized) {
        return Err(format!("invalid phone `{raw}`: not a 10-15 digit number"));
    }
    Ok(normalized)
}

/// Resolved indices of the required logical columns.
struct ColumnMap {
    name: usize,
    phone: usize,
}

fn map_columns(headers: &[String]) -> Result<ColumnMap, SenderoError> {
    let find = |synonyms: &[&str]| {
        headers
            .iter()
            .position(|h| synonyms.contains(&h.as_str()))
    };

    let name = find(NAME_SYNONYMS).ok_or_else(|| {
        SenderoError::Validation("required column `name` not found in header".to_string())
    })?;
    let phone = find(PHONE_SYNONYMS).ok_or_else(|| {
        SenderoError::Validation("required column `phone` not found in header".to_string())
    })?;

    Ok(ColumnMap { name, phone })
}

/// Trim, case-fold, and strip diacritics from a header cell.
fn normalize_header(raw: &str) -> String {
    raw.trim()
        .chars()
        .flat_map(|c| c.to_lowercase())
        .map(fold_diacritic)
        .collect()
}

/// Fold the accented characters common in Spanish/Portuguese headers.
fn fold_diacritic(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ä' | 'ã' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'ô' | 'ö' | 'õ' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'ñ' => 'n',
        'ç' => 'c',
        other => other,
    }
}

/// Auto-detect the delimiter from the header line: semicolon wins only when
/// it outnumbers commas.
fn detect_delimiter(raw: &[u8]) -> u8 {
    let first_line = raw.split(|&b| b == b'\n').next().unwrap_or(raw);
    let commas = first_line.iter().filter(|&&b| b == b',').count();
    let semis = first_line.iter().filter(|&&b| b == b';').count();
    if semis > commas { b';' } else { b',' }
}

fn strip_bom(raw: &[u8]) -> &[u8] {
    raw.strip_prefix(b"\xef\xbb\xbf").unwrap_or(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CC: &str = "57";

    #[test]
    fn ingests_well_formed_comma_file() {
        let file = b"name,phone,city\nAna,3001234567,Bogota\nLuis,+573009999999,Cali\n";
        let report = ingest(file, CC).unwrap();
        assert_eq!(report.contacts.len(), 2);
        assert!(report.errors.is_empty());

        assert_eq!(report.contacts[0].name, "Ana");
        assert_eq!(report.contacts[0].phone, "+573001234567");
        assert_eq!(report.contacts[0].extra.get("city").unwrap(), "Bogota");
        assert_eq!(report.contacts[1].phone, "+573009999999");
    }

    #[test]
    fn detects_semicolon_delimiter() {
        let file = b"nombre;telefono\nAna;3001234567\n";
        let report = ingest(file, CC).unwrap();
        assert_eq!(report.contacts.len(), 1);
        assert_eq!(report.contacts[0].phone, "+573001234567");
    }

    #[test]
    fn accepts_diacritic_headers() {
        let file = "nombre,teléfono\nAna,3001234567\n".as_bytes();
        let report = ingest(file, CC).unwrap();
        assert_eq!(report.contacts.len(), 1);
    }

    #[test]
    fn missing_name_reported_at_one_based_row() {
        // Worked example from the product contract: row 2 has no name.
        let file = b"name,phone\nAna,3001234567\n,3009999999\n";
        let report = ingest(file, CC).unwrap();
        assert_eq!(report.contacts.len(), 1);
        assert_eq!(report.contacts[0].phone, "+573001234567");
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].row, 2);
        assert!(report.errors[0].reason.contains("name"));
    }

    #[test]
    fn short_phone_is_rejected_with_reason() {
        let file = b"name,phone\nAna,12345\n Luis,3001234567\n";
        let report = ingest(file, CC).unwrap();
        assert_eq!(report.contacts.len(), 1);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].row, 1);
        assert!(report.errors[0].reason.contains("10 digits"));
    }

    #[test]
    fn overlong_phone_is_rejected() {
        let file = b"name,phone\nAna,12345678901234567890\n Luis,3001234567\n";
        let report = ingest(file, CC).unwrap();
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].row, 1);
    }

    #[test]
    fn zero_valid_contacts_is_empty_input() {
        let file = b"name,phone\n,3001234567\nAna,123\n";
        let err = ingest(file, CC).unwrap_err();
        assert!(matches!(err, SenderoError::EmptyInput));
    }

    #[test]
    fn missing_phone_column_fails_whole_file() {
        let file = b"name,email\nAna,ana@example.com\n";
        let err = ingest(file, CC).unwrap_err();
        assert!(matches!(err, SenderoError::Validation(_)));
        assert!(err.to_string().contains("phone"));
    }

    #[test]
    fn missing_name_column_fails_whole_file() {
        let file = b"telefono\n3001234567\n";
        let err = ingest(file, CC).unwrap_err();
        assert!(err.to_string().contains("name"));
    }

    #[test]
    fn utf8_bom_does_not_break_first_header() {
        let file = b"\xef\xbb\xbfname,phone\nAna,3001234567\n";
        let report = ingest(file, CC).unwrap();
        assert_eq!(report.contacts.len(), 1);
    }

    #[test]
    fn every_valid_contact_matches_the_phone_shape() {
        let file = b"name,phone\nAna,(300) 123-4567\nLuis,+57 300 999 9999\nEva,13125550123\n";
        let report = ingest(file, CC).unwrap();
        assert_eq!(report.contacts.len(), 3);
        for contact in &report.contacts {
            assert!(
                is_valid_phone(&contact.phone),
                "bad phone: {}",
                contact.phone
            );
        }
    }

    #[test]
    fn extra_columns_become_template_variables() {
        let file = b"name,phone,plan,saldo\nAna,3001234567,premium,12000\n";
        let report = ingest(file, CC).unwrap();
        let extra = &report.contacts[0].extra;
        assert_eq!(extra.get("plan").unwrap(), "premium");
        assert_eq!(extra.get("saldo").unwrap(), "12000");
    }

    #[test]
    fn normalize_phone_prefixes_bare_local_numbers() {
        assert_eq!(normalize_phone("3001234567", "57").unwrap(), "+573001234567");
        // Already carries a country code: only the plus is added.
        assert_eq!(
            normalize_phone("573001234567", "57").unwrap(),
            "+573001234567"
        );
        // Formatting noise is stripped.
        assert_eq!(
            normalize_phone("+57 (300) 123-4567", "57").unwrap(),
            "+573001234567"
        );
    }

    #[test]
    fn header_normalization_folds_case_and_accents() {
        assert_eq!(normalize_header("  Teléfono "), "telefono");
        assert_eq!(normalize_header("NOMBRE"), "nombre");
        assert_eq!(normalize_header("Número"), "numero");
    }
}
