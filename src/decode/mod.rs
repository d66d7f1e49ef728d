//! Streaming decoder: bytes in, section and field events out.
//!
//! The decoder wraps a [`quick_xml::Reader`] and never builds a tree. It
//! keeps only the path of currently open elements, so memory stays
//! proportional to nesting depth no matter how large the file is.
//!
//! A leaf element (text only, or empty) becomes one [`SaftEvent::Field`];
//! every element with child elements becomes a
//! [`SaftEvent::SectionStart`] / [`SaftEvent::SectionEnd`] pair. Namespace
//! prefixes are stripped.

pub mod values;

use std::collections::VecDeque;
use std::io::{self, BufRead, Read};

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tracing::warn;

use crate::core::{CancelToken, SaftConfig, SaftError};
use crate::schema;

/// One decoded event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaftEvent {
    SectionStart { name: String },
    Field { name: String, value: String },
    SectionEnd { name: String },
}

/// How often (in events) the cancellation token is polled.
const CANCEL_POLL_INTERVAL: u64 = 4096;

/// Lazy, single-pass event stream over a SAF-T document.
///
/// The iterator is fused: after the first error or the end of the document
/// it yields `None`.
pub struct Decoder<R: BufRead> {
    reader: Reader<Tracked<R>>,
    buf: Vec<u8>,
    path: Vec<String>,
    /// Element opened but not yet known to be a leaf or a section.
    pending: Option<String>,
    text: String,
    queue: VecDeque<SaftEvent>,
    namespace: Option<String>,
    in_ledger: usize,
    max_depth: usize,
    max_bytes: Option<u64>,
    cancel: Option<CancelToken>,
    events: u64,
    finished: bool,
}

impl<R: BufRead> Decoder<R> {
    pub fn new(reader: R, config: &SaftConfig) -> Self {
        let mut reader = Reader::from_reader(Tracked::new(reader));
        reader.config_mut().trim_text(true);
        Self {
            reader,
            buf: Vec::with_capacity(1024),
            path: Vec::with_capacity(16),
            pending: None,
            text: String::new(),
            queue: VecDeque::with_capacity(2),
            namespace: None,
            in_ledger: 0,
            max_depth: config.max_depth,
            max_bytes: config.max_input_bytes,
            cancel: config.cancel.clone(),
            events: 0,
            finished: false,
        }
    }

    /// Namespace URI declared on the root element, once it has been read.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Names of the currently open elements, outermost first.
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Bytes consumed so far.
    pub fn bytes_read(&self) -> u64 {
        self.reader.buffer_position() as u64
    }

    fn decode_error(&self, offset: u64, message: impl Into<String>) -> SaftError {
        let (line, column) = self.reader.get_ref().locate(offset);
        let message = message.into();
        warn!(offset, line, column, %message, "decoding aborted");
        SaftError::Decode {
            offset,
            line,
            column,
            message,
        }
    }

    fn local_name(&self, e: &BytesStart<'_>) -> Result<String, SaftError> {
        std::str::from_utf8(e.local_name().as_ref())
            .map(str::to_string)
            .map_err(|err| self.decode_error(self.bytes_read(), format!("element name is not UTF-8: {err}")))
    }

    fn capture_namespace(&mut self, e: &BytesStart<'_>) {
        let prefix = e.name().prefix().map(|p| p.as_ref().to_vec());
        let wanted: Vec<u8> = match &prefix {
            Some(p) => [b"xmlns:".as_slice(), p.as_slice()].concat(),
            None => b"xmlns".to_vec(),
        };
        for attr in e.attributes().flatten() {
            if attr.key.as_ref() == wanted.as_slice() {
                self.namespace = Some(String::from_utf8_lossy(&attr.value).into_owned());
            }
        }
    }

    /// Checks depth and ledger nesting for an element about to be opened.
    fn enter(&mut self, name: &str) -> Result<(), SaftError> {
        if self.path.len() >= self.max_depth {
            return Err(self.decode_error(
                self.bytes_read(),
                format!("nesting deeper than {} levels at <{name}>", self.max_depth),
            ));
        }
        if name == "GeneralLedgerEntries" {
            self.in_ledger += 1;
        }
        if self.in_ledger > 0 {
            if let Some(expected) = schema::required_parent(name) {
                let found = self.path.last().map(String::as_str).unwrap_or("");
                if found != expected {
                    warn!(element = name, expected, found, "ledger nesting violated");
                    return Err(SaftError::Nesting {
                        element: name.to_string(),
                        expected: expected.to_string(),
                        found: found.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// The pending element has children: it is a section.
    fn promote_pending(&mut self) {
        if let Some(name) = self.pending.take() {
            self.text.clear();
            self.queue.push_back(SaftEvent::SectionStart { name });
        }
    }

    fn check_limits(&mut self) -> Result<(), SaftError> {
        if let Some(limit) = self.max_bytes {
            if self.bytes_read() > limit {
                warn!(limit, "input size limit exceeded");
                return Err(SaftError::SizeLimit { limit });
            }
        }
        if self.events % CANCEL_POLL_INTERVAL == 0
            && self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
        {
            return Err(SaftError::Cancelled);
        }
        self.events += 1;
        Ok(())
    }

    fn step(&mut self) -> Result<(), SaftError> {
        self.check_limits()?;
        self.buf.clear();
        let event = match self.reader.read_event_into(&mut self.buf) {
            Ok(event) => event.into_owned(),
            Err(err) => {
                let offset = self.reader.error_position() as u64;
                return Err(self.decode_error(offset, err.to_string()));
            }
        };
        match event {
            Event::Start(e) => {
                let name = self.local_name(&e)?;
                if self.path.is_empty() {
                    self.capture_namespace(&e);
                }
                self.enter(&name)?;
                self.promote_pending();
                self.path.push(name.clone());
                self.pending = Some(name);
                self.text.clear();
            }
            Event::Empty(e) => {
                let name = self.local_name(&e)?;
                if self.path.is_empty() {
                    self.capture_namespace(&e);
                }
                self.enter(&name)?;
                if name == "GeneralLedgerEntries" {
                    self.in_ledger -= 1;
                }
                self.promote_pending();
                self.queue.push_back(SaftEvent::Field {
                    name,
                    value: String::new(),
                });
            }
            Event::Text(e) => {
                if self.pending.is_some() {
                    let text = e
                        .unescape()
                        .map_err(|err| self.decode_error(self.bytes_read(), err.to_string()))?;
                    self.text.push_str(&text);
                }
            }
            Event::CData(e) => {
                if self.pending.is_some() {
                    let text = std::str::from_utf8(&e)
                        .map_err(|err| self.decode_error(self.bytes_read(), err.to_string()))?;
                    self.text.push_str(text);
                }
            }
            Event::End(_) => {
                let Some(name) = self.path.pop() else {
                    return Err(self.decode_error(self.bytes_read(), "unexpected closing tag"));
                };
                if name == "GeneralLedgerEntries" {
                    self.in_ledger -= 1;
                }
                match self.pending.take() {
                    Some(leaf) if leaf == name => {
                        let value = std::mem::take(&mut self.text).trim().to_string();
                        self.queue.push_back(SaftEvent::Field { name, value });
                    }
                    _ => self.queue.push_back(SaftEvent::SectionEnd { name }),
                }
            }
            Event::Eof => {
                if let Some(open) = self.path.last() {
                    let message = format!("unexpected end of input inside <{open}>");
                    return Err(self.decode_error(self.bytes_read(), message));
                }
                self.finished = true;
            }
            Event::Decl(_) | Event::PI(_) | Event::Comment(_) | Event::DocType(_) => {}
        }
        Ok(())
    }
}

impl<R: BufRead> Iterator for Decoder<R> {
    type Item = Result<SaftEvent, SaftError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(event) = self.queue.pop_front() {
                return Some(Ok(event));
            }
            if self.finished {
                return None;
            }
            if let Err(err) = self.step() {
                self.finished = true;
                self.queue.clear();
                return Some(Err(err));
            }
        }
    }
}

impl<R: BufRead> std::iter::FusedIterator for Decoder<R> {}

/// How many recent newline offsets are kept for line/column reporting.
const NEWLINE_WINDOW: usize = 256;

/// `BufRead` adapter that counts lines as bytes are consumed.
struct Tracked<R> {
    inner: R,
    consumed: u64,
    newlines: u64,
    recent: VecDeque<u64>,
}

impl<R: BufRead> Tracked<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            consumed: 0,
            newlines: 0,
            recent: VecDeque::with_capacity(NEWLINE_WINDOW),
        }
    }

    /// 1-based line and column of a byte offset already consumed.
    ///
    /// Exact as long as the offset lies within the last few hundred lines,
    /// which holds for decode errors. The column is 0 when unknown.
    fn locate(&self, offset: u64) -> (u64, u64) {
        let after = self.recent.iter().filter(|&&nl| nl >= offset).count() as u64;
        let line = self.newlines - after + 1;
        let column = match self.recent.iter().rev().find(|&&nl| nl < offset) {
            Some(nl) => offset - nl,
            None if self.newlines == after => offset + 1,
            None => 0,
        };
        (line, column)
    }
}

impl<R: BufRead> Read for Tracked<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        let n = {
            let available = self.fill_buf()?;
            let n = available.len().min(out.len());
            out[..n].copy_from_slice(&available[..n]);
            n
        };
        self.consume(n);
        Ok(n)
    }
}

impl<R: BufRead> BufRead for Tracked<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        let Self {
            inner,
            consumed,
            newlines,
            recent,
        } = self;
        if let Ok(buf) = inner.fill_buf() {
            let upto = amt.min(buf.len());
            for (i, _) in buf[..upto].iter().enumerate().filter(|(_, b)| **b == b'\n') {
                *newlines += 1;
                if recent.len() == NEWLINE_WINDOW {
                    recent.pop_front();
                }
                recent.push_back(*consumed + i as u64);
            }
        }
        *consumed += amt as u64;
        inner.consume(amt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events(xml: &str) -> Result<Vec<SaftEvent>, SaftError> {
        Decoder::new(xml.as_bytes(), &SaftConfig::default()).collect()
    }

    fn start(name: &str) -> SaftEvent {
        SaftEvent::SectionStart { name: name.into() }
    }

    fn end(name: &str) -> SaftEvent {
        SaftEvent::SectionEnd { name: name.into() }
    }

    fn field(name: &str, value: &str) -> SaftEvent {
        SaftEvent::Field {
            name: name.into(),
            value: value.into(),
        }
    }

    #[test]
    fn leaves_become_fields() {
        let got = events(
            r#"<n1:AuditFile xmlns:n1="urn:StandardAuditFile-Taxation-Financial:NO">
                 <n1:Header><n1:AuditFileVersion>1.30</n1:AuditFileVersion><n1:UserID/></n1:Header>
               </n1:AuditFile>"#,
        )
        .unwrap();
        assert_eq!(
            got,
            vec![
                start("AuditFile"),
                start("Header"),
                field("AuditFileVersion", "1.30"),
                field("UserID", ""),
                end("Header"),
                end("AuditFile"),
            ]
        );
    }

    #[test]
    fn root_namespace_is_captured() {
        let xml = r#"<AuditFile xmlns="urn:StandardAuditFile-Taxation-Financial:NO"><Header/></AuditFile>"#;
        let mut decoder = Decoder::new(xml.as_bytes(), &SaftConfig::default());
        let _ = decoder.next();
        assert_eq!(decoder.namespace(), Some(schema::SAFT_NAMESPACE));
    }

    #[test]
    fn bytes_read_advances_with_events() {
        let xml = "<AuditFile><Header><AuditFileVersion>1.30</AuditFileVersion></Header></AuditFile>";
        let mut decoder = Decoder::new(xml.as_bytes(), &SaftConfig::default());
        assert_eq!(decoder.bytes_read(), 0);
        let mut last = 0;
        while let Some(event) = decoder.next() {
            event.unwrap();
            assert!(decoder.bytes_read() >= last);
            last = decoder.bytes_read();
        }
        assert_eq!(last, xml.len() as u64);
    }

    #[test]
    fn entities_are_unescaped() {
        let got = events("<A><B>Ola &amp; Kari AS</B></A>").unwrap();
        assert_eq!(got[1], field("B", "Ola & Kari AS"));
    }

    #[test]
    fn malformed_markup_reports_line() {
        let xml = "<AuditFile>\n<Header>\n<X>1</Y>\n</Header>\n</AuditFile>";
        let err = events(xml).unwrap_err();
        match err {
            SaftError::Decode { line, .. } => assert_eq!(line, 3),
            other => panic!("expected decode error, got {other:?}"),
        }
    }

    #[test]
    fn truncated_input_is_fatal() {
        let err = events("<AuditFile><Header>").unwrap_err();
        assert_eq!(err.code(), "DECODE_ERROR");
    }

    #[test]
    fn line_outside_transaction_is_rejected() {
        let xml = "<AuditFile><GeneralLedgerEntries><Journal><Line><RecordID>1</RecordID></Line></Journal></GeneralLedgerEntries></AuditFile>";
        let err = events(xml).unwrap_err();
        match err {
            SaftError::Nesting {
                element, expected, ..
            } => {
                assert_eq!(element, "Line");
                assert_eq!(expected, "Transaction");
            }
            other => panic!("expected nesting error, got {other:?}"),
        }
    }

    #[test]
    fn invoice_lines_outside_ledger_are_not_nesting_errors() {
        let xml = "<AuditFile><SourceDocuments><Invoice><Line><X>1</X></Line></Invoice></SourceDocuments></AuditFile>";
        assert!(events(xml).is_ok());
    }

    #[test]
    fn depth_guard() {
        let config = SaftConfig {
            max_depth: 8,
            ..Default::default()
        };
        let xml = "<a><b><c><d><e><f><g><h><i>1</i></h></g></f></e></d></c></b></a>";
        let result: Result<Vec<_>, _> = Decoder::new(xml.as_bytes(), &config).collect();
        assert!(result.is_err());
    }

    #[test]
    fn size_limit() {
        let config = SaftConfig {
            max_input_bytes: Some(10),
            ..Default::default()
        };
        let xml = "<AuditFile><Header><AuditFileVersion>1.30</AuditFileVersion></Header></AuditFile>";
        let result: Result<Vec<_>, _> = Decoder::new(xml.as_bytes(), &config).collect();
        assert!(matches!(result, Err(SaftError::SizeLimit { limit: 10 })));
    }

    #[test]
    fn iterator_is_fused_after_error() {
        let mut decoder = Decoder::new("<A><B></A>".as_bytes(), &SaftConfig::default());
        let mut saw_error = false;
        for item in decoder.by_ref() {
            if item.is_err() {
                saw_error = true;
                break;
            }
        }
        assert!(saw_error);
        assert!(decoder.next().is_none());
    }
}
