//! Event-driven model builder.
//!
//! Each entity element (Header, Account, Customer, Supplier, TaxTableEntry,
//! AnalysisTypeTableEntry, Line) is collected into a small [`Node`] until its
//! closing tag, then converted into its typed form. Journals and transactions
//! are built around their already converted children, so no more than one
//! transaction's lines are ever pending.

use std::io::BufRead;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, info, warn};

use super::paths;
use super::types::*;
use crate::core::{Finding, FindingCode, SaftConfig, SaftError};
use crate::decode::values::{self, Parsed};
use crate::decode::{Decoder, SaftEvent};
use crate::schema::{self, SAFT_NAMESPACE, SchemaVersion};
use crate::validate::structural;

/// Result of a successful build.
#[derive(Debug)]
pub struct Built {
    pub file: AuditFile,
    /// Structural findings raised as each entity completed.
    pub structural: Vec<Finding>,
}

/// Decode `reader` and build the model in one pass.
pub fn build<R: BufRead>(reader: R, config: &SaftConfig) -> Result<Built, SaftError> {
    config.check()?;
    let mut decoder = Decoder::new(reader, config);
    let mut builder = ModelBuilder::new(config);
    let mut namespace_seen = false;
    while let Some(event) = decoder.next() {
        let event = event?;
        if !namespace_seen {
            builder.set_namespace(decoder.namespace());
            namespace_seen = true;
        }
        builder.push(event)?;
    }
    builder.finish()
}

/// Elements that may arrive as an empty leaf but are sections.
const SECTIONS: &[&str] = &[
    "Header",
    "MasterFiles",
    "GeneralLedgerEntries",
    "GeneralLedgerAccounts",
    "Customers",
    "Suppliers",
    "TaxTable",
    "AnalysisTypeTable",
    "Account",
    "Customer",
    "Supplier",
    "TaxTableEntry",
    "AnalysisTypeTableEntry",
    "Journal",
    "Transaction",
    "Line",
];

/// Subtree of one entity, collected until its closing tag.
#[derive(Debug, Default)]
struct Node {
    name: String,
    fields: Vec<(String, String)>,
    children: Vec<Node>,
}

impl Node {
    fn new(name: String) -> Self {
        Self {
            name,
            ..Default::default()
        }
    }

    fn values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.fields
            .iter()
            .filter(move |(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    fn children<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    fn child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.name == name)
    }
}

enum Frame {
    Root,
    Container,
    Skip,
    Node(Node),
    Entries(Node, Vec<Journal>),
    Journal(Node, Vec<Transaction>),
    Transaction(Node, Vec<Line>),
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Kind {
    Root,
    Container,
    Skip,
    Node,
    Entries,
    Journal,
    Transaction,
}

impl Frame {
    fn kind(&self) -> Kind {
        match self {
            Self::Root => Kind::Root,
            Self::Container => Kind::Container,
            Self::Skip => Kind::Skip,
            Self::Node(_) => Kind::Node,
            Self::Entries(..) => Kind::Entries,
            Self::Journal(..) => Kind::Journal,
            Self::Transaction(..) => Kind::Transaction,
        }
    }
}

/// Push-style builder fed with [`SaftEvent`]s.
pub struct ModelBuilder<'c> {
    config: &'c SaftConfig,
    version: Option<SchemaVersion>,
    path: Vec<String>,
    frames: Vec<Frame>,
    sections: Vec<String>,
    namespace: Option<String>,
    header: Option<Header>,
    master: MasterFiles,
    entries: Option<GeneralLedgerEntries>,
    indices: Indices,
    notes: Vec<Finding>,
    structural: Vec<Finding>,
    stats: BuildStats,
}

impl<'c> ModelBuilder<'c> {
    pub fn new(config: &'c SaftConfig) -> Self {
        Self {
            config,
            version: None,
            path: Vec::with_capacity(8),
            frames: Vec::with_capacity(8),
            sections: Vec::with_capacity(3),
            namespace: None,
            header: None,
            master: MasterFiles::default(),
            entries: None,
            indices: Indices::default(),
            notes: Vec::new(),
            structural: Vec::new(),
            stats: BuildStats::default(),
        }
    }

    /// Record the namespace declared on the root element.
    pub fn set_namespace(&mut self, namespace: Option<&str>) {
        self.namespace = namespace.map(str::to_string);
        if namespace != Some(SAFT_NAMESPACE) {
            let message = match namespace {
                Some(ns) => format!("namespace '{ns}' is not {SAFT_NAMESPACE}"),
                None => format!("no namespace declared, expected {SAFT_NAMESPACE}"),
            };
            self.notes
                .push(Finding::warning(FindingCode::NamespaceMismatch, "AuditFile", message));
        }
    }

    pub fn push(&mut self, event: SaftEvent) -> Result<(), SaftError> {
        match event {
            SaftEvent::SectionStart { name } => self.start(name),
            SaftEvent::Field { name, value } => {
                if value.is_empty() && SECTIONS.contains(&name.as_str()) {
                    self.start(name.clone())?;
                    self.end()
                } else {
                    self.field(name, value)
                }
            }
            SaftEvent::SectionEnd { .. } => self.end(),
        }
    }

    /// Freeze the model. Fails when a top-level section never appeared.
    pub fn finish(self) -> Result<Built, SaftError> {
        if let Some(open) = self.path.last() {
            return Err(SaftError::DocumentOrder(format!("document ended inside <{open}>")));
        }
        let header = self
            .header
            .ok_or_else(|| SaftError::DocumentOrder("<Header> is missing".into()))?;
        if !self.sections.iter().any(|s| s == "MasterFiles") {
            return Err(SaftError::DocumentOrder("<MasterFiles> is missing".into()));
        }
        let entries = self
            .entries
            .ok_or_else(|| SaftError::DocumentOrder("<GeneralLedgerEntries> is missing".into()))?;
        let version = self
            .version
            .ok_or_else(|| SaftError::UnsupportedVersion(String::new()))?;

        info!(
            %version,
            accounts = self.stats.accounts,
            customers = self.stats.customers,
            suppliers = self.stats.suppliers,
            transactions = self.stats.transactions,
            lines = self.stats.lines,
            skipped = self.stats.skipped,
            "model built"
        );
        Ok(Built {
            file: AuditFile {
                header,
                master_files: self.master,
                entries,
                version,
                namespace: self.namespace,
                decode_findings: self.notes,
                stats: self.stats,
                indices: self.indices,
            },
            structural: self.structural,
        })
    }

    fn version(&self) -> SchemaVersion {
        self.version.unwrap_or(SchemaVersion::V1_3)
    }

    fn element_path(&self, name: &str) -> String {
        let mut parts: Vec<&str> = self.path.iter().skip(1).map(String::as_str).collect();
        parts.push(name);
        parts.join("/")
    }

    fn start(&mut self, name: String) -> Result<(), SaftError> {
        let top = self.frames.last().map(Frame::kind);
        let frame = match top {
            None if name == "AuditFile" => Frame::Root,
            None => {
                return Err(SaftError::DocumentOrder(format!(
                    "root element must be <AuditFile>, found <{name}>"
                )));
            }
            Some(Kind::Skip) => Frame::Skip,
            Some(_) if !self.admit(&name) => Frame::Skip,
            Some(Kind::Root) => match name.as_str() {
                "Header" => {
                    self.top_level(&name)?;
                    Frame::Node(Node::new(name.clone()))
                }
                "MasterFiles" => {
                    self.top_level(&name)?;
                    Frame::Container
                }
                "GeneralLedgerEntries" => {
                    self.top_level(&name)?;
                    Frame::Entries(Node::new(name.clone()), Vec::new())
                }
                _ => Frame::Skip,
            },
            Some(Kind::Container) => match name.as_str() {
                "GeneralLedgerAccounts" | "Customers" | "Suppliers" | "TaxTable"
                | "AnalysisTypeTable" => Frame::Container,
                "Account" | "Customer" | "Supplier" | "TaxTableEntry" | "AnalysisTypeTableEntry" => {
                    Frame::Node(Node::new(name.clone()))
                }
                _ => Frame::Skip,
            },
            Some(Kind::Node) => Frame::Node(Node::new(name.clone())),
            Some(Kind::Entries) if name == "Journal" => {
                Frame::Journal(Node::new(name.clone()), Vec::new())
            }
            Some(Kind::Journal) if name == "Transaction" => {
                Frame::Transaction(Node::new(name.clone()), Vec::new())
            }
            Some(Kind::Transaction) if name == "Line" => Frame::Node(Node::new(name.clone())),
            Some(_) => Frame::Skip,
        };
        if matches!(frame, Frame::Container | Frame::Entries(..)) {
            debug!(section = %name, "entering section");
        }
        self.path.push(name);
        self.frames.push(frame);
        Ok(())
    }

    fn field(&mut self, name: String, value: String) -> Result<(), SaftError> {
        match self.frames.last().map(Frame::kind) {
            None if name == "AuditFile" => return Ok(()),
            None => {
                return Err(SaftError::DocumentOrder(format!(
                    "root element must be <AuditFile>, found <{name}>"
                )));
            }
            Some(Kind::Skip) => return Ok(()),
            Some(_) if !self.admit(&name) => return Ok(()),
            Some(_) => {}
        }
        match self.frames.last_mut() {
            Some(
                Frame::Node(node)
                | Frame::Entries(node, _)
                | Frame::Journal(node, _)
                | Frame::Transaction(node, _),
            ) => node.fields.push((name, value)),
            _ => {}
        }
        Ok(())
    }

    fn end(&mut self) -> Result<(), SaftError> {
        self.path.pop();
        let Some(frame) = self.frames.pop() else {
            return Ok(());
        };
        match frame {
            Frame::Root | Frame::Container | Frame::Skip => {}
            Frame::Node(node) => {
                if let Some(Frame::Node(parent)) = self.frames.last_mut() {
                    parent.children.push(node);
                } else {
                    self.finish_entity(node)?;
                }
            }
            Frame::Entries(node, journals) => self.finish_entries(node, journals),
            Frame::Journal(node, transactions) => self.finish_journal(node, transactions),
            Frame::Transaction(node, lines) => self.finish_transaction(node, lines),
        }
        Ok(())
    }

    /// Vocabulary check for `name` under the current element. Returns
    /// whether the element should be decoded.
    fn admit(&mut self, name: &str) -> bool {
        let Some(parent) = self.path.last() else {
            return true;
        };
        let vocabulary = schema::vocabulary(parent);
        if schema::is_known_but_unused(&format!("{vocabulary}/{name}")) {
            self.stats.unused_elements += 1;
            let path = self.element_path(name);
            debug!(%path, "element not used in the Norwegian profile");
            self.notes.push(Finding::info(
                FindingCode::UnusedElement,
                path,
                format!("<{name}> is not used in the Norwegian profile and was ignored"),
            ));
            return false;
        }
        if schema::is_known_child(vocabulary, name) == Some(false) {
            self.stats.unknown_elements += 1;
            let message = format!("<{name}> is not a known child of <{parent}>");
            let path = self.element_path(name);
            self.notes.push(Finding::new(
                self.config.unknown_element_severity(),
                FindingCode::UnknownElement,
                path,
                message,
            ));
            return false;
        }
        true
    }

    fn top_level(&mut self, name: &str) -> Result<(), SaftError> {
        let seen = |s: &str| self.sections.iter().any(|x| x == s);
        if seen(name) {
            return Err(SaftError::DocumentOrder(format!("duplicate <{name}> section")));
        }
        match name {
            "Header" if !self.sections.is_empty() => {
                return Err(SaftError::DocumentOrder(
                    "<Header> must be the first section".into(),
                ));
            }
            "Header" => {}
            _ if !seen("Header") => {
                return Err(SaftError::DocumentOrder(format!(
                    "<{name}> appears before <Header>"
                )));
            }
            "MasterFiles" if seen("GeneralLedgerEntries") => {
                return Err(SaftError::DocumentOrder(
                    "<MasterFiles> must precede <GeneralLedgerEntries>".into(),
                ));
            }
            "GeneralLedgerEntries" if !seen("MasterFiles") => {
                return Err(SaftError::DocumentOrder(
                    "<MasterFiles> is missing before <GeneralLedgerEntries>".into(),
                ));
            }
            _ => {}
        }
        self.sections.push(name.to_string());
        Ok(())
    }

    fn finish_entity(&mut self, node: Node) -> Result<(), SaftError> {
        match node.name.as_str() {
            "Header" => self.finish_header(&node)?,
            "Account" => self.finish_account(&node),
            "Customer" => self.finish_party(&node, PartyRole::Customer),
            "Supplier" => self.finish_party(&node, PartyRole::Supplier),
            "TaxTableEntry" => self.finish_tax_entry(&node),
            "AnalysisTypeTableEntry" => self.finish_analysis_entry(&node),
            "Line" => self.finish_line(&node),
            _ => {}
        }
        Ok(())
    }

    fn finish_header(&mut self, node: &Node) -> Result<(), SaftError> {
        let header = header(&mut Cx::new(&mut self.notes, paths::HEADER), node);
        let declared = header.audit_file_version.as_deref();
        let version = match (self.config.version_override, declared) {
            (Some(version), _) => {
                debug!(%version, declared, "schema version overridden");
                version
            }
            (None, Some(tag)) => SchemaVersion::from_tag(tag).inspect_err(|_| {
                warn!(declared = tag, "unsupported AuditFileVersion");
            })?,
            (None, None) => return Err(SaftError::UnsupportedVersion(String::new())),
        };
        debug!(%version, "header decoded");
        self.version = Some(version);
        structural::check(&header, version, &mut self.structural);
        self.header = Some(header);
        Ok(())
    }

    fn skipped(&mut self, entity: &str) {
        self.stats.skipped += 1;
        warn!(entity, "entity skipped");
    }

    fn duplicate(&mut self, path: &str, key_name: &str, key: &str, kept: bool) {
        let outcome = if kept {
            "kept but not indexed"
        } else {
            "dropped, the first occurrence wins"
        };
        self.notes.push(
            Finding::error(
                FindingCode::DuplicateKey,
                format!("{path}/{key_name}"),
                format!("duplicate {key_name} '{key}', {outcome}"),
            )
            .owned_by(Some(key.to_string())),
        );
    }

    fn finish_account(&mut self, node: &Node) {
        let Some(account) = account(&mut Cx::new(&mut self.notes, paths::ACCOUNT), node) else {
            return self.skipped("Account");
        };
        if self.indices.accounts.contains_key(&account.id) {
            self.stats.skipped += 1;
            return self.duplicate(paths::ACCOUNT, "AccountID", &account.id, false);
        }
        structural::check(&account, self.version(), &mut self.structural);
        self.indices
            .accounts
            .insert(account.id.clone(), self.master.accounts.len());
        self.master.accounts.push(account);
        self.stats.accounts += 1;
    }

    fn finish_party(&mut self, node: &Node, role: PartyRole) {
        let (path, key_name) = match role {
            PartyRole::Customer => (paths::CUSTOMER, "CustomerID"),
            PartyRole::Supplier => (paths::SUPPLIER, "SupplierID"),
        };
        let Some(party) = party(&mut Cx::new(&mut self.notes, path), node, role, key_name) else {
            return self.skipped(role.as_str());
        };
        let version = self.version();
        let (index, list, count) = match role {
            PartyRole::Customer => (
                &mut self.indices.customers,
                &mut self.master.customers,
                &mut self.stats.customers,
            ),
            PartyRole::Supplier => (
                &mut self.indices.suppliers,
                &mut self.master.suppliers,
                &mut self.stats.suppliers,
            ),
        };
        if index.contains_key(&party.id) {
            self.stats.skipped += 1;
            return self.duplicate(path, key_name, &party.id, false);
        }
        index.insert(party.id.clone(), list.len());
        *count += 1;
        structural::check(&party, version, &mut self.structural);
        list.push(party);
    }

    fn finish_tax_entry(&mut self, node: &Node) {
        let tax_type = Cx::new(&mut self.notes, paths::TAX_TABLE_ENTRY).text(node, "", "TaxType");
        let Some(tax_type) = tax_type else {
            self.notes.push(Finding::error(
                FindingCode::MissingField,
                format!("{}/TaxType", paths::TAX_TABLE_ENTRY),
                "<TaxTableEntry> has no <TaxType>, its tax codes were skipped",
            ));
            for _ in node.children("TaxCodeDetails") {
                self.skipped("TaxCodeDetails");
            }
            return;
        };
        for details in node.children("TaxCodeDetails") {
            let Some(detail) = tax_code(&mut Cx::new(&mut self.notes, paths::TAX_CODE), details, &tax_type)
            else {
                self.skipped("TaxCodeDetails");
                continue;
            };
            let codes = self.indices.tax_codes.entry(tax_type.clone()).or_default();
            if codes.contains_key(&detail.code) {
                self.stats.skipped += 1;
                let key = format!("{tax_type}/{}", detail.code);
                self.duplicate(paths::TAX_CODE, "TaxCode", &key, false);
                continue;
            }
            codes.insert(detail.code.clone(), self.master.tax_codes.len());
            structural::check(&detail, self.version(), &mut self.structural);
            self.master.tax_codes.push(detail);
            self.stats.tax_codes += 1;
        }
    }

    fn finish_analysis_entry(&mut self, node: &Node) {
        let Some(entry) = analysis_entry(&mut Cx::new(&mut self.notes, paths::ANALYSIS_ENTRY), node)
        else {
            return self.skipped("AnalysisTypeTableEntry");
        };
        let ids = self
            .indices
            .analysis
            .entry(entry.analysis_type.clone())
            .or_default();
        if ids.contains_key(&entry.id) {
            self.stats.skipped += 1;
            let key = format!("{}/{}", entry.analysis_type, entry.id);
            return self.duplicate(paths::ANALYSIS_ENTRY, "AnalysisID", &key, false);
        }
        ids.insert(entry.id.clone(), self.master.analysis_types.len());
        structural::check(&entry, self.version(), &mut self.structural);
        self.master.analysis_types.push(entry);
        self.stats.analysis_entries += 1;
    }

    fn finish_line(&mut self, node: &Node) {
        let version = self.version();
        let Some(line) = line(&mut Cx::new(&mut self.notes, paths::LINE), node, version) else {
            return self.skipped("Line");
        };
        if let Some(Frame::Transaction(_, lines)) = self.frames.last_mut() {
            lines.push(line);
        }
    }

    fn finish_transaction(&mut self, node: Node, lines: Vec<Line>) {
        let Some(tx) = transaction(&mut Cx::new(&mut self.notes, paths::TRANSACTION), &node, lines)
        else {
            return self.skipped("Transaction");
        };
        if let Some(Frame::Journal(_, transactions)) = self.frames.last_mut() {
            transactions.push(tx);
        }
    }

    /// Accept a journal: index it with its lines and run the structural
    /// checks of everything it contains.
    fn finish_journal(&mut self, node: Node, transactions: Vec<Transaction>) {
        let Some(journal) = journal(&mut Cx::new(&mut self.notes, paths::JOURNAL), &node, transactions)
        else {
            return self.skipped("Journal");
        };
        let Some(Frame::Entries(_, journals)) = self.frames.last() else {
            return;
        };
        let position = journals.len();
        if self.indices.journals.contains_key(&journal.id) {
            self.duplicate(paths::JOURNAL, "JournalID", &journal.id, true);
        } else {
            self.indices.journals.insert(journal.id.clone(), position);
        }

        let version = self.version();
        structural::check(&journal, version, &mut self.structural);
        for (ti, tx) in journal.transactions.iter().enumerate() {
            structural::check(tx, version, &mut self.structural);
            for (li, line) in tx.lines.iter().enumerate() {
                structural::check(line, version, &mut self.structural);
                if self.indices.records.contains_key(&line.record_id) {
                    self.duplicate(paths::LINE, "RecordID", &line.record_id, true);
                    continue;
                }
                self.indices.records.insert(
                    line.record_id.clone(),
                    LineLocation {
                        journal: position,
                        transaction: ti,
                        line: li,
                    },
                );
            }
            self.stats.lines += tx.lines.len();
        }
        self.stats.transactions += journal.transactions.len();
        self.stats.journals += 1;
        debug!(journal = %journal.id, transactions = journal.transactions.len(), "journal decoded");

        if let Some(Frame::Entries(_, journals)) = self.frames.last_mut() {
            journals.push(journal);
        }
    }

    fn finish_entries(&mut self, node: Node, journals: Vec<Journal>) {
        let mut cx = Cx::new(&mut self.notes, paths::ENTRIES);
        let entries = GeneralLedgerEntries {
            number_of_entries: cx.count(&node, "", "NumberOfEntries"),
            total_debit: cx.decimal(&node, "", "TotalDebit"),
            total_credit: cx.decimal(&node, "", "TotalCredit"),
            journals,
        };
        structural::check(&entries, self.version(), &mut self.structural);
        self.entries = Some(entries);
    }
}

/// Conversion context of one entity: where it lives, who owns it, and
/// whether any of its values failed to parse.
struct Cx<'a> {
    notes: &'a mut Vec<Finding>,
    base: &'static str,
    owner: Option<String>,
    failed: bool,
}

fn join(at: &str, name: &str) -> String {
    if at.is_empty() {
        name.to_string()
    } else {
        format!("{at}/{name}")
    }
}

impl<'a> Cx<'a> {
    fn new(notes: &'a mut Vec<Finding>, base: &'static str) -> Self {
        Self {
            notes,
            base,
            owner: None,
            failed: false,
        }
    }

    fn path(&self, at: &str, name: &str) -> String {
        format!("{}/{}", self.base, join(at, name))
    }

    fn note(&mut self, finding: Finding) {
        self.notes.push(finding.owned_by(self.owner.clone()));
    }

    /// Read the identifying field. A missing key fails the entity.
    fn key(&mut self, node: &Node, name: &str) -> Option<String> {
        let key = self.text(node, "", name);
        match &key {
            Some(k) => self.owner = Some(k.clone()),
            None => {
                let path = self.path("", name);
                let message = format!("<{}> has no <{name}> and was skipped", node.name);
                self.note(Finding::error(FindingCode::MissingField, path, message));
                self.failed = true;
            }
        }
        key
    }

    fn text(&mut self, node: &Node, at: &str, name: &str) -> Option<String> {
        let mut values = node.values(name);
        let first = values.next()?;
        let extra = values.count();
        if extra > 0 {
            let path = self.path(at, name);
            let message = format!("<{name}> occurs {} times, at most once allowed", extra + 1);
            self.note(Finding::error(FindingCode::Cardinality, path, message));
        }
        let value = first.trim();
        (!value.is_empty()).then(|| value.to_string())
    }

    fn invalid(&mut self, at: &str, name: &str, raw: &str, what: &str) {
        let path = self.path(at, name);
        self.note(Finding::error(
            FindingCode::InvalidValue,
            path,
            format!("'{raw}' is not {what}"),
        ));
        self.failed = true;
    }

    fn parse<T>(
        &mut self,
        node: &Node,
        at: &str,
        name: &str,
        what: &str,
        parse: impl Fn(&str) -> Option<T>,
    ) -> Option<T> {
        let raw = self.text(node, at, name)?;
        let parsed = parse(&raw);
        if parsed.is_none() {
            self.invalid(at, name, &raw, what);
        }
        parsed
    }

    fn decimal_text(&mut self, raw: &str, at: &str, name: &str) -> Option<Decimal> {
        let parsed = values::parse_decimal(raw);
        if parsed.is_some_and(|p| !values::in_range(p.value())) {
            self.invalid(at, name, raw, "within the 18-digit decimal range");
            return None;
        }
        match parsed {
            Some(Parsed::Canonical(d)) => Some(d),
            Some(Parsed::Normalized(d)) => {
                let path = self.path(at, name);
                self.note(Finding::warning(
                    FindingCode::NonCanonicalNumber,
                    path,
                    format!("'{raw}' read as {d}"),
                ));
                Some(d)
            }
            None => {
                self.invalid(at, name, raw, "a decimal number");
                None
            }
        }
    }

    fn decimal(&mut self, node: &Node, at: &str, name: &str) -> Option<Decimal> {
        let raw = self.text(node, at, name)?;
        self.decimal_text(&raw, at, name)
    }

    fn date(&mut self, node: &Node, at: &str, name: &str) -> Option<NaiveDate> {
        self.parse(node, at, name, "a date", values::parse_date)
    }

    fn uint(&mut self, node: &Node, at: &str, name: &str) -> Option<u32> {
        self.parse(node, at, name, "a non-negative integer", values::parse_u32)
    }

    fn int(&mut self, node: &Node, at: &str, name: &str) -> Option<i32> {
        self.parse(node, at, name, "an integer", values::parse_i32)
    }

    fn count(&mut self, node: &Node, at: &str, name: &str) -> Option<u64> {
        self.parse(node, at, name, "a non-negative integer", values::parse_u64)
    }

    fn flag(&mut self, node: &Node, at: &str, name: &str) -> Option<bool> {
        self.parse(node, at, name, "a boolean", values::parse_bool)
    }

    /// An amount structure, or a bare decimal in its place.
    fn amount(&mut self, node: &Node, at: &str, name: &str) -> Option<Amount> {
        let Some(child) = node.child(name) else {
            return self.decimal(node, at, name).map(Amount::new);
        };
        let sub = join(at, name);
        let Some(raw) = self.text(child, &sub, "Amount") else {
            let path = self.path(&sub, "Amount");
            self.note(Finding::error(
                FindingCode::MissingField,
                path,
                format!("<{name}> has no <Amount>"),
            ));
            self.failed = true;
            return None;
        };
        let amount = self.decimal_text(&raw, &sub, "Amount")?;
        Some(Amount {
            amount,
            currency_code: self.text(child, &sub, "CurrencyCode"),
            currency_amount: self.decimal(child, &sub, "CurrencyAmount"),
            exchange_rate: self.decimal(child, &sub, "ExchangeRate"),
        })
    }

    /// Resolve a version-dependent amount: `legacy` (1.2) or the
    /// debit/credit pair (1.3). When both shapes are present the one of
    /// `version` is kept.
    fn tagged(
        &mut self,
        node: &Node,
        at: &str,
        [legacy, debit, credit]: [&str; 3],
        version: SchemaVersion,
    ) -> Option<TaggedAmount> {
        let single = self.amount(node, at, legacy);
        let debit_amount = self.amount(node, at, debit);
        let credit_amount = self.amount(node, at, credit);
        let sided = debit_amount.is_some() || credit_amount.is_some();
        match (single, sided) {
            (None, false) => None,
            (Some(a), false) => Some(TaggedAmount::Legacy(a)),
            (None, true) => Some(TaggedAmount::Sided {
                debit: debit_amount,
                credit: credit_amount,
            }),
            (Some(a), true) => {
                let path = self.path(at, legacy);
                self.note(Finding::error(
                    FindingCode::ChoiceConflict,
                    path,
                    format!("both <{legacy}> and <{debit}>/<{credit}> present, kept the {version} form"),
                ));
                Some(match version {
                    SchemaVersion::V1_2 => TaggedAmount::Legacy(a),
                    SchemaVersion::V1_3 => TaggedAmount::Sided {
                        debit: debit_amount,
                        credit: credit_amount,
                    },
                })
            }
        }
    }

    fn balance(&mut self, node: &Node, at: &str, side: &str) -> BalancePair {
        BalancePair {
            debit: self.decimal(node, at, &format!("{side}DebitBalance")),
            credit: self.decimal(node, at, &format!("{side}CreditBalance")),
        }
    }

    fn addresses(&mut self, node: &Node, at: &str) -> Vec<Address> {
        let sub = join(at, "Address");
        let mut out = Vec::new();
        for a in node.children("Address") {
            out.push(Address {
                street_name: self.text(a, &sub, "StreetName"),
                number: self.text(a, &sub, "Number"),
                additional: self.text(a, &sub, "AdditionalAddressDetail"),
                city: self.text(a, &sub, "City"),
                postal_code: self.text(a, &sub, "PostalCode"),
                region: self.text(a, &sub, "Region"),
                country: self.text(a, &sub, "Country"),
                address_type: self.text(a, &sub, "AddressType"),
                text: None,
            });
        }
        out.extend(node.values("Address").map(|t| Address {
            text: Some(t.trim().to_string()).filter(|t| !t.is_empty()),
            ..Default::default()
        }));
        out
    }

    fn company(&mut self, node: &Node, at: &str) -> Company {
        let mut tax_registrations = Vec::new();
        let sub = join(at, "TaxRegistration");
        for t in node.children("TaxRegistration") {
            tax_registrations.push(TaxRegistration {
                number: self.text(t, &sub, "TaxRegistrationNumber"),
                authority: self.text(t, &sub, "TaxAuthority"),
            });
        }
        Company {
            registration_number: self.text(node, at, "RegistrationNumber"),
            name: self.text(node, at, "Name"),
            addresses: self.addresses(node, at),
            tax_registrations,
        }
    }
}

fn header(cx: &mut Cx<'_>, node: &Node) -> Header {
    Header {
        audit_file_version: cx.text(node, "", "AuditFileVersion"),
        audit_file_country: cx.text(node, "", "AuditFileCountry"),
        audit_file_date_created: cx.date(node, "", "AuditFileDateCreated"),
        software_company_name: cx.text(node, "", "SoftwareCompanyName"),
        software_id: cx.text(node, "", "SoftwareID"),
        software_version: cx.text(node, "", "SoftwareVersion"),
        company: node.child("Company").map(|c| cx.company(c, "Company")),
        default_currency_code: cx.text(node, "", "DefaultCurrencyCode"),
        selection_criteria: node.child("SelectionCriteria").map(|s| {
            let at = "SelectionCriteria";
            SelectionCriteria {
                start_date: cx.date(s, at, "SelectionStartDate"),
                end_date: cx.date(s, at, "SelectionEndDate"),
                period_start: cx.uint(s, at, "PeriodStart"),
                period_start_year: cx.int(s, at, "PeriodStartYear"),
                period_end: cx.uint(s, at, "PeriodEnd"),
                period_end_year: cx.int(s, at, "PeriodEndYear"),
            }
        }),
        header_comment: cx.text(node, "", "HeaderComment"),
        tax_accounting_basis: cx.text(node, "", "TaxAccountingBasis"),
        user_id: cx.text(node, "", "UserID"),
        sender: node
            .child("AuditFileSender")
            .map(|c| cx.company(c, "AuditFileSender")),
    }
}

fn account(cx: &mut Cx<'_>, node: &Node) -> Option<Account> {
    let id = cx.key(node, "AccountID");
    let account = Account {
        id: id.unwrap_or_default(),
        description: cx.text(node, "", "AccountDescription"),
        standard_account_id: cx.text(node, "", "StandardAccountID"),
        grouping_category: cx.text(node, "", "GroupingCategory"),
        grouping_code: cx.text(node, "", "GroupingCode"),
        account_type: cx.text(node, "", "AccountType"),
        opening: cx.balance(node, "", "Opening"),
        closing: cx.balance(node, "", "Closing"),
    };
    (!cx.failed).then_some(account)
}

fn party(cx: &mut Cx<'_>, node: &Node, role: PartyRole, key_name: &str) -> Option<Party> {
    let id = cx.key(node, key_name);

    let mut balance_accounts = Vec::new();
    let inline = BalanceAccount {
        account_id: cx.text(node, "", "AccountID"),
        opening: cx.balance(node, "", "Opening"),
        closing: cx.balance(node, "", "Closing"),
        inline: true,
    };
    if inline.account_id.is_some() || inline.opening.is_declared() || inline.closing.is_declared() {
        balance_accounts.push(inline);
    }
    for b in node.children("BalanceAccount") {
        balance_accounts.push(BalanceAccount {
            account_id: cx.text(b, "BalanceAccount", "AccountID"),
            opening: cx.balance(b, "BalanceAccount", "Opening"),
            closing: cx.balance(b, "BalanceAccount", "Closing"),
            inline: false,
        });
    }

    let party_info = node.child("PartyInfo");
    let payment_terms_days = party_info
        .and_then(|info| info.child("PaymentTerms"))
        .and_then(|terms| cx.uint(terms, "PartyInfo/PaymentTerms", "Days"));

    let party = Party {
        role,
        id: id.unwrap_or_default(),
        name: cx.text(node, "", "Name"),
        registration_number: cx.text(node, "", "RegistrationNumber"),
        addresses: cx.addresses(node, ""),
        balance_accounts,
        payment_terms_days,
        has_party_info: party_info.is_some(),
    };
    (!cx.failed).then_some(party)
}

fn tax_code(cx: &mut Cx<'_>, node: &Node, tax_type: &str) -> Option<TaxCodeDetail> {
    let code = cx.key(node, "TaxCode")?;
    cx.owner = Some(format!("{tax_type}/{code}"));

    let percentage = cx.decimal(node, "", "TaxPercentage");
    if let Some(p) = percentage.filter(|p| *p < Decimal::ZERO || *p > dec!(100)) {
        let path = cx.path("", "TaxPercentage");
        cx.note(Finding::warning(
            FindingCode::ImplausibleValue,
            path,
            format!("tax percentage {p} is outside 0..=100"),
        ));
    }
    let mut base_rates = Vec::new();
    for raw in node.values("BaseRate") {
        if let Some(rate) = cx.decimal_text(raw.trim(), "", "BaseRate") {
            base_rates.push(rate);
        }
    }
    let detail = TaxCodeDetail {
        tax_type: tax_type.to_string(),
        code,
        description: cx.text(node, "", "Description"),
        percentage,
        flat_rate: cx.amount(node, "", "FlatTaxRate"),
        country: cx.text(node, "", "Country"),
        standard_tax_code: cx.text(node, "", "StandardTaxCode"),
        compensation: cx.flag(node, "", "Compensation"),
        base_rates,
    };
    (!cx.failed).then_some(detail)
}

fn analysis_entry(cx: &mut Cx<'_>, node: &Node) -> Option<AnalysisTypeEntry> {
    let analysis_type = cx.key(node, "AnalysisType")?;
    let id = cx.key(node, "AnalysisID")?;
    cx.owner = Some(format!("{analysis_type}/{id}"));
    let entry = AnalysisTypeEntry {
        analysis_type,
        type_description: cx.text(node, "", "AnalysisTypeDescription"),
        id,
        id_description: cx.text(node, "", "AnalysisIDDescription"),
    };
    (!cx.failed).then_some(entry)
}

fn line(cx: &mut Cx<'_>, node: &Node, version: SchemaVersion) -> Option<Line> {
    let record_id = cx.key(node, "RecordID");

    let mut analysis = Vec::new();
    for a in node.children("Analysis") {
        analysis.push(AnalysisRef {
            analysis_type: cx.text(a, "Analysis", "AnalysisType"),
            analysis_id: cx.text(a, "Analysis", "AnalysisID"),
            amount: cx.tagged(
                a,
                "Analysis",
                ["AnalysisAmount", "DebitAnalysisAmount", "CreditAnalysisAmount"],
                version,
            ),
        });
    }
    let mut tax = Vec::new();
    for t in node.children("TaxInformation") {
        let at = "TaxInformation";
        tax.push(TaxInformation {
            tax_type: cx.text(t, at, "TaxType"),
            tax_code: cx.text(t, at, "TaxCode"),
            tax_percentage: cx.decimal(t, at, "TaxPercentage"),
            tax_base: cx.decimal(t, at, "TaxBase"),
            amount: cx.tagged(t, at, ["TaxAmount", "DebitTaxAmount", "CreditTaxAmount"], version),
        });
    }

    let line = Line {
        record_id: record_id.unwrap_or_default(),
        account_id: cx.text(node, "", "AccountID"),
        analysis,
        value_date: cx.date(node, "", "ValueDate"),
        source_document_id: cx.text(node, "", "SourceDocumentID"),
        customer_id: cx.text(node, "", "CustomerID"),
        supplier_id: cx.text(node, "", "SupplierID"),
        description: cx.text(node, "", "Description"),
        debit: cx.amount(node, "", "DebitAmount"),
        credit: cx.amount(node, "", "CreditAmount"),
        tax,
        reference_number: cx.text(node, "", "ReferenceNumber"),
        due_date: cx.date(node, "", "DueDate"),
    };
    (!cx.failed).then_some(line)
}

fn transaction(cx: &mut Cx<'_>, node: &Node, lines: Vec<Line>) -> Option<Transaction> {
    let id = cx.key(node, "TransactionID");
    let tx = Transaction {
        id: id.unwrap_or_default(),
        period: cx.uint(node, "", "Period"),
        period_year: cx.int(node, "", "PeriodYear"),
        transaction_date: cx.date(node, "", "TransactionDate"),
        source_id: cx.text(node, "", "SourceID"),
        transaction_type: cx.text(node, "", "TransactionType"),
        description: cx.text(node, "", "Description"),
        batch_id: cx.text(node, "", "BatchID"),
        system_entry_date: cx.date(node, "", "SystemEntryDate"),
        gl_posting_date: cx.date(node, "", "GLPostingDate"),
        system_id: cx.text(node, "", "SystemID"),
        voucher_type: cx.text(node, "", "VoucherType"),
        voucher_description: cx.text(node, "", "VoucherDescription"),
        modification_date: cx.date(node, "", "ModificationDate"),
        lines,
    };
    (!cx.failed).then_some(tx)
}

fn journal(cx: &mut Cx<'_>, node: &Node, transactions: Vec<Transaction>) -> Option<Journal> {
    let id = cx.key(node, "JournalID")?;
    Some(Journal {
        id,
        description: cx.text(node, "", "Description"),
        journal_type: cx.text(node, "", "Type"),
        transactions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Severity;

    const NS: &str = "urn:StandardAuditFile-Taxation-Financial:NO";

    fn doc(version: &str, master: &str, entries: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<AuditFile xmlns="{NS}">
  <Header>
    <AuditFileVersion>{version}</AuditFileVersion>
    <AuditFileCountry>NO</AuditFileCountry>
    <AuditFileDateCreated>2025-03-02</AuditFileDateCreated>
    <SoftwareCompanyName>Regnskap AS</SoftwareCompanyName>
    <SoftwareID>Bok</SoftwareID>
    <SoftwareVersion>7</SoftwareVersion>
    <Company><RegistrationNumber>999999999</RegistrationNumber><Name>Test AS</Name></Company>
    <DefaultCurrencyCode>NOK</DefaultCurrencyCode>
    <SelectionCriteria><SelectionStartDate>2025-01-01</SelectionStartDate><SelectionEndDate>2025-02-28</SelectionEndDate></SelectionCriteria>
    <TaxAccountingBasis>A</TaxAccountingBasis>
  </Header>
  <MasterFiles>{master}</MasterFiles>
  <GeneralLedgerEntries>{entries}</GeneralLedgerEntries>
</AuditFile>"#
        )
    }

    fn account_xml(id: &str) -> String {
        format!(
            "<GeneralLedgerAccounts><Account><AccountID>{id}</AccountID><AccountDescription>Bank</AccountDescription>\
             <StandardAccountID>19</StandardAccountID><GroupingCategory>RF-1167</GroupingCategory><GroupingCode>1920</GroupingCode>\
             <AccountType>GL</AccountType><OpeningDebitBalance>0</OpeningDebitBalance><ClosingDebitBalance>0</ClosingDebitBalance></Account></GeneralLedgerAccounts>"
        )
    }

    fn built(xml: &str) -> Built {
        build(xml.as_bytes(), &SaftConfig::default()).unwrap()
    }

    #[test]
    fn header_and_version() {
        let b = built(&doc("1.30", &account_xml("1920"), "<NumberOfEntries>0</NumberOfEntries>"));
        assert_eq!(b.file.version, SchemaVersion::V1_3);
        assert_eq!(b.file.header.company.as_ref().unwrap().name.as_deref(), Some("Test AS"));
        assert_eq!(b.file.namespace.as_deref(), Some(NS));
        assert!(b.file.account("1920").is_some());
    }

    #[test]
    fn unsupported_version_is_fatal() {
        let err = build(doc("2.00", "", "").as_bytes(), &SaftConfig::default()).unwrap_err();
        assert_eq!(err.code(), "UNSUPPORTED_VERSION");
    }

    #[test]
    fn version_override_wins() {
        let config = SaftConfig {
            version_override: Some(SchemaVersion::V1_2),
            ..Default::default()
        };
        let b = build(doc("9.9", "", "").as_bytes(), &config).unwrap();
        assert_eq!(b.file.version, SchemaVersion::V1_2);
    }

    #[test]
    fn master_files_after_entries_is_fatal() {
        let xml = format!(
            r#"<AuditFile xmlns="{NS}"><Header><AuditFileVersion>1.30</AuditFileVersion></Header>
               <GeneralLedgerEntries/><MasterFiles/></AuditFile>"#
        );
        let err = build(xml.as_bytes(), &SaftConfig::default()).unwrap_err();
        assert!(matches!(err, SaftError::DocumentOrder(_)));
    }

    #[test]
    fn header_must_come_first() {
        let xml = "<AuditFile><MasterFiles/><Header/></AuditFile>";
        let err = build(xml.as_bytes(), &SaftConfig::default()).unwrap_err();
        assert!(err.to_string().contains("before <Header>"));
    }

    #[test]
    fn duplicate_account_keeps_first() {
        let master = format!(
            "{}{}",
            account_xml("1920"),
            account_xml("1920").replace("Bank", "Bank 2")
        );
        let b = built(&doc("1.30", &master, ""));
        assert_eq!(b.file.master_files.accounts.len(), 1);
        assert_eq!(b.file.account("1920").unwrap().description.as_deref(), Some("Bank"));
        assert!(
            b.file
                .decode_findings
                .iter()
                .any(|f| f.code == FindingCode::DuplicateKey)
        );
    }

    #[test]
    fn unparseable_line_is_skipped_and_siblings_survive() {
        let entries = r#"<Journal><JournalID>GL</JournalID><Description>x</Description><Type>GL</Type>
            <Transaction><TransactionID>1</TransactionID>
              <Line><RecordID>1</RecordID><AccountID>1920</AccountID><DebitAmount><Amount>abc</Amount></DebitAmount></Line>
              <Line><RecordID>2</RecordID><AccountID>1920</AccountID><CreditAmount><Amount>10.00</Amount></CreditAmount></Line>
            </Transaction></Journal>"#;
        let b = built(&doc("1.30", &account_xml("1920"), entries));
        assert_eq!(b.file.stats.lines, 1);
        assert_eq!(b.file.stats.skipped, 1);
        assert!(b.file.line("2").is_some());
        let invalid = b
            .file
            .decode_findings
            .iter()
            .find(|f| f.code == FindingCode::InvalidValue)
            .unwrap();
        assert_eq!(invalid.owner_key.as_deref(), Some("1"));
        assert_eq!(
            invalid.element_path,
            "GeneralLedgerEntries/Journal/Transaction/Line/DebitAmount/Amount"
        );
    }

    #[test]
    fn norwegian_number_is_accepted_with_warning() {
        let entries = r#"<Journal><JournalID>GL</JournalID><Transaction><TransactionID>1</TransactionID>
              <Line><RecordID>1</RecordID><AccountID>1920</AccountID><DebitAmount><Amount>1 000,50</Amount></DebitAmount></Line>
            </Transaction></Journal>"#;
        let b = built(&doc("1.30", &account_xml("1920"), entries));
        let (_, line) = b.file.line("1").unwrap();
        assert_eq!(line.debit_amount(), dec!(1000.50));
        let warning = b
            .file
            .decode_findings
            .iter()
            .find(|f| f.code == FindingCode::NonCanonicalNumber)
            .unwrap();
        assert_eq!(warning.severity, Severity::Warning);
    }

    #[test]
    fn unused_and_unknown_elements_are_reported() {
        let master = format!("{}<Products><Product/></Products><Gadgets/>", account_xml("1920"));
        let b = built(&doc("1.30", &master, ""));
        let codes: Vec<_> = b.file.decode_findings.iter().map(|f| (f.code, f.severity)).collect();
        assert!(codes.contains(&(FindingCode::UnusedElement, Severity::Info)));
        assert!(codes.contains(&(FindingCode::UnknownElement, Severity::Info)));
        assert_eq!(b.file.stats.unused_elements, 1);
        assert_eq!(b.file.stats.unknown_elements, 1);
    }

    #[test]
    fn strict_mode_makes_unknown_elements_errors() {
        let config = SaftConfig {
            strict_unknown_elements: true,
            ..Default::default()
        };
        let xml = doc("1.30", "<Gadgets/>", "");
        let b = build(xml.as_bytes(), &config).unwrap();
        let f = b
            .file
            .decode_findings
            .iter()
            .find(|f| f.code == FindingCode::UnknownElement)
            .unwrap();
        assert_eq!(f.severity, Severity::Error);
        assert_eq!(f.element_path, "MasterFiles/Gadgets");
    }

    #[test]
    fn v12_inline_party_balance_and_v13_balance_accounts_share_a_shape() {
        let v12 = r#"<Customers><Customer><CustomerID>K1</CustomerID><Name>Kunde</Name><Address><City>Oslo</City></Address>
            <AccountID>1500</AccountID><OpeningDebitBalance>100</OpeningDebitBalance><ClosingDebitBalance>50</ClosingDebitBalance>
            </Customer></Customers>"#;
        let v13 = r#"<Customers><Customer><CustomerID>K1</CustomerID><Name>Kunde</Name><Address>NA</Address>
            <BalanceAccount><AccountID>1500</AccountID><OpeningDebitBalance>100</OpeningDebitBalance><ClosingDebitBalance>50</ClosingDebitBalance></BalanceAccount>
            <PartyInfo><PaymentTerms><Days>14</Days></PaymentTerms></PartyInfo>
            </Customer></Customers>"#;
        let a = built(&doc("1.20", v12, ""));
        let b = built(&doc("1.30", v13, ""));
        let pa = a.file.customer("K1").unwrap();
        let pb = b.file.customer("K1").unwrap();
        assert!(pa.balance_accounts[0].inline);
        assert!(!pb.balance_accounts[0].inline);
        assert_eq!(pa.balance_accounts[0].account_id, pb.balance_accounts[0].account_id);
        assert_eq!(pa.balance_accounts[0].opening, pb.balance_accounts[0].opening);
        assert_eq!(pb.payment_terms_days, Some(14));
        assert!(pb.addresses[0].is_not_available());
    }

    #[test]
    fn implausible_tax_percentage_is_a_warning() {
        let master = r#"<TaxTable><TaxTableEntry><TaxType>MVA</TaxType><Description>Merverdiavgift</Description>
            <TaxCodeDetails><TaxCode>3</TaxCode><Description>Utgående</Description><TaxPercentage>250</TaxPercentage>
            <Country>NO</Country><StandardTaxCode>3</StandardTaxCode></TaxCodeDetails>
            </TaxTableEntry></TaxTable>"#;
        let b = built(&doc("1.30", master, ""));
        assert!(b.file.tax_code("MVA", "3").is_some());
        let f = b
            .file
            .decode_findings
            .iter()
            .find(|f| f.code == FindingCode::ImplausibleValue)
            .unwrap();
        assert_eq!(f.owner_key.as_deref(), Some("MVA/3"));
    }

    #[test]
    fn duplicate_record_ids_are_kept_but_reported() {
        let entries = r#"<Journal><JournalID>GL</JournalID><Transaction><TransactionID>1</TransactionID>
              <Line><RecordID>1</RecordID><AccountID>1920</AccountID><DebitAmount><Amount>5</Amount></DebitAmount></Line>
              <Line><RecordID>1</RecordID><AccountID>1920</AccountID><CreditAmount><Amount>5</Amount></CreditAmount></Line>
            </Transaction></Journal>"#;
        let b = built(&doc("1.30", &account_xml("1920"), entries));
        assert_eq!(b.file.lines().count(), 2);
        assert_eq!(
            b.file
                .decode_findings
                .iter()
                .filter(|f| f.code == FindingCode::DuplicateKey)
                .count(),
            1
        );
    }
}
