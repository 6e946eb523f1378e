// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Display-name sanitization for dropped files.
//
// Print servers and desktop "print to PDF" drivers decorate file names with
// job numbers and application names, and SMB clients with a mismatched code
// page turn accented letters into two-character garbage.  The display name
// stored with each file record is cleaned up here.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

/// `-job_<digits>.pdf` appended by CUPS-PDF style drivers.
static JOB_SUFFIX: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)-job_\d+\.pdf$").ok());

/// Application names that drivers prepend or append around a dash.
const APPLICATIONS: &str = r"(?:microsoft\s+)?(?:word|excel|powerpoint|outlook)|libreoffice(?:\s+(?:writer|calc|impress))?|google\s+(?:docs|sheets|slides|chrome)|adobe\s+(?:acrobat(?:\s+reader)?|reader)|wps\s+office|notepad";

static LEADING_APPLICATION: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(&format!(r"(?i)^\s*(?:{APPLICATIONS})\s*-\s*")).ok());

static TRAILING_APPLICATION: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\s*-\s*(?:{APPLICATIONS})\s*(?P<ext>\.pdf)?$")).ok()
});

/// UTF-8 accented letters that were decoded as Windows-1252 / Latin-1.
const MOJIBAKE: &[(&str, &str)] = &[
    ("Ã¡", "á"),
    ("Ã©", "é"),
    ("Ã­", "í"),
    ("Ã³", "ó"),
    ("Ãº", "ú"),
    ("Ã£", "ã"),
    ("Ãµ", "õ"),
    ("Ã¢", "â"),
    ("Ãª", "ê"),
    ("Ã´", "ô"),
    ("Ã§", "ç"),
    ("Ã¼", "ü"),
    ("Ã±", "ñ"),
    ("Ã¨", "è"),
    ("Ã\u{a0}", "à"),
    ("Ã\u{81}", "Á"),
    ("Ã‰", "É"),
    ("Ã\u{8d}", "Í"),
    ("Ã“", "Ó"),
    ("Ãš", "Ú"),
    ("Ãƒ", "Ã"),
    ("Ã•", "Õ"),
    ("Ã‚", "Â"),
    ("ÃŠ", "Ê"),
    ("Ã”", "Ô"),
    ("Ã‡", "Ç"),
    ("Ã€", "À"),
];

/// Clean up a dropped file's name for display.
///
/// Total: never panics, and returns `name` unchanged if any step fails or
/// the cleaned result would be empty.
pub fn sanitize_file_name(name: &str) -> String {
    match try_sanitize(name) {
        Some(cleaned) if !cleaned.is_empty() => {
            if cleaned != name {
                debug!(original = name, sanitized = %cleaned, "file name sanitized");
            }
            cleaned
        }
        _ => name.to_owned(),
    }
}

fn try_sanitize(name: &str) -> Option<String> {
    let job_suffix = JOB_SUFFIX.as_ref()?;
    let leading = LEADING_APPLICATION.as_ref()?;
    let trailing = TRAILING_APPLICATION.as_ref()?;

    let mut cleaned = job_suffix.replace(name, ".pdf").into_owned();
    cleaned = leading.replace(&cleaned, "").into_owned();
    cleaned = trailing.replace(&cleaned, "${ext}").into_owned();

    for (garbled, letter) in MOJIBAKE {
        if cleaned.contains(garbled) {
            cleaned = cleaned.replace(garbled, letter);
        }
    }

    cleaned = cleaned.replace('_', " ");
    cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    cleaned = collapse_doubled_extension(&cleaned);
    Some(cleaned)
}

/// `report.pdf.pdf` → `report.pdf` (case-insensitive, repeated).
fn collapse_doubled_extension(name: &str) -> String {
    let mut current = name;
    loop {
        let Some(dot) = current.rfind('.') else {
            return current.to_owned();
        };
        let ext = &current[dot..];
        let stem = &current[..dot];
        if ext.len() > 1 && stem.len() > ext.len() && stem.to_lowercase().ends_with(&ext.to_lowercase())
        {
            current = &current[..stem.len()];
        } else {
            return current.to_owned();
        }
    }
}
