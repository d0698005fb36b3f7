//! Log redaction for patient identifiers and other PII.
//!
//! Every formatted log line passes through `Redactor::global()` before it
//! reaches the sink. Built-in rules cover:
//! - `patient_id=...` / `Patient ID: ...` fields
//! - medical record numbers, SSN-like numbers
//! - email addresses and phone numbers
//! - `DOB: YYYY-MM-DD`
//!
//! `CHRONICARE_REDACT_PATTERN` adds one site-specific regex whose matches
//! become `[REDACTED-ID]`.

use std::borrow::Cow;
use std::io::{self, Write};
use std::sync::OnceLock;

use regex::{Regex, RegexSet};
use tracing_subscriber::fmt::MakeWriter;

const EXTRA_PATTERN_ENV: &str = "CHRONICARE_REDACT_PATTERN";

/// Lines longer than this are cut before redaction.
const MAX_LINE_BYTES: usize = 16 * 1024;

const BUILT_IN: [(&str, &str); 6] = [
    (
        r"(?i)\b(patient[ _]?id)(\s*[:=]\s*)[A-Za-z0-9_.\-]+",
        "${1}${2}[REDACTED-ID]",
    ),
    (r"(?i)\bMRN[:\s]?\d{6,10}\b", "[REDACTED-MRN]"),
    (
        r"(?i)\b(dob|date of birth)(\s*[:=]\s*)\d{4}-\d{2}-\d{2}",
        "${1}${2}[REDACTED-DOB]",
    ),
    (r"\b\d{3}-\d{2}-\d{4}\b", "[REDACTED-SSN]"),
    (
        r"(?i)\b[a-z0-9][a-z0-9._%+-]*@[a-z0-9-]+(?:\.[a-z0-9-]+)*\.[a-z]{2,}\b",
        "[REDACTED-EMAIL]",
    ),
    (
        r"\b(?:\+?1[-.\s]?)?\(?\d{3}\)?[-.\s]\d{3}[-.\s]\d{4}\b",
        "[REDACTED-PHONE]",
    ),
];

/// Compiled redaction rules.
pub struct Redactor {
    any: RegexSet,
    rules: Vec<(Regex, String)>,
}

impl Redactor {
    /// Build from `(pattern, replacement)` pairs; invalid patterns are skipped.
    #[must_use]
    pub fn new<'a, I>(patterns: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let rules: Vec<(Regex, String)> = patterns
            .into_iter()
            .filter_map(|(p, r)| Regex::new(p).ok().map(|re| (re, r.to_string())))
            .collect();
        let any = RegexSet::new(rules.iter().map(|(re, _)| re.as_str()))
            .unwrap_or_else(|_| RegexSet::empty());
        Self { any, rules }
    }

    /// Process-wide redactor: built-in rules plus `CHRONICARE_REDACT_PATTERN`.
    pub fn global() -> &'static Redactor {
        static GLOBAL: OnceLock<Redactor> = OnceLock::new();
        GLOBAL.get_or_init(|| {
            let extra = std::env::var(EXTRA_PATTERN_ENV).ok();
            let extra_rule = extra.as_deref().map(str::trim).filter(|p| {
                let ok = Regex::new(p).is_ok();
                if !ok {
                    eprintln!("Ignoring invalid {EXTRA_PATTERN_ENV}");
                }
                ok
            });
            Redactor::new(
                BUILT_IN
                    .iter()
                    .copied()
                    .chain(extra_rule.map(|p| (p, "[REDACTED-ID]"))),
            )
        })
    }

    /// Whether `text` holds anything this redactor would replace.
    #[must_use]
    pub fn matches(&self, text: &str) -> bool {
        self.any.is_match(text)
    }

    /// Replace every match; borrows `text` when nothing matched.
    #[must_use]
    pub fn redact<'t>(&self, text: &'t str) -> Cow<'t, str> {
        let hits = self.any.matches(text);
        if !hits.matched_any() {
            return Cow::Borrowed(text);
        }
        let mut out = text.to_string();
        for idx in hits.iter() {
            let (re, replacement) = &self.rules[idx];
            out = re.replace_all(&out, replacement.as_str()).into_owned();
        }
        Cow::Owned(out)
    }
}

/// Redact `input` with the global rules.
#[must_use]
pub fn sanitize(input: &str) -> String {
    Redactor::global().redact(input).into_owned()
}

/// Whether `input` contains anything the global rules would redact.
#[must_use]
pub fn contains_pii(input: &str) -> bool {
    Redactor::global().matches(input)
}

/// `MakeWriter` that redacts each formatted log line.
#[derive(Debug)]
pub struct SanitizingMakeWriter<M> {
    inner: M,
}

impl<M> SanitizingMakeWriter<M> {
    #[must_use]
    pub fn new(inner: M) -> Self {
        Self { inner }
    }
}

impl<'a, M: MakeWriter<'a>> MakeWriter<'a> for SanitizingMakeWriter<M> {
    type Writer = RedactingWriter<M::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter {
            sink: self.inner.make_writer(),
            pending: Vec::new(),
        }
    }
}

/// Collects bytes until a newline, then writes the redacted line.
pub struct RedactingWriter<W: Write> {
    sink: W,
    pending: Vec<u8>,
}

impl<W: Write> RedactingWriter<W> {
    fn emit(&mut self, line: &[u8]) -> io::Result<()> {
        let cut = line.len().min(MAX_LINE_BYTES);
        let text = String::from_utf8_lossy(&line[..cut]);
        self.sink
            .write_all(Redactor::global().redact(&text).as_bytes())?;
        if cut < line.len() {
            self.sink.write_all(b" [TRUNCATED]\n")?;
        }
        Ok(())
    }

    fn drain_complete_lines(&mut self) -> io::Result<()> {
        while let Some(end) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=end).collect();
            self.emit(&line)?;
        }
        Ok(())
    }
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        self.drain_complete_lines()?;
        if self.pending.len() > MAX_LINE_BYTES {
            let rest = std::mem::take(&mut self.pending);
            self.emit(&rest)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.drain_complete_lines()?;
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            self.emit(&rest)?;
        }
        self.sink.flush()
    }
}

impl<W: Write> Drop for RedactingWriter<W> {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}
