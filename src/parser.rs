// Filing orchestration: discover, parse concurrently, merge, validate
use crate::config::Config;
use crate::context::{CanonicalIndex, ContextMapper};
use crate::instance::{InstanceDocument, InstanceParser};
use crate::linkbase::{LinkbaseKind, LinkbaseParser, Linkbases, STANDARD_LABEL};
use crate::model::{Fact, FilingData, FinancialStatement, StatementType};
use crate::schema::{SchemaDocument, SchemaParser};
use crate::statement::{builder_for, StatementBuilder, StatementInputs};
use crate::validator::{
    CalculationValidator, DataValidator, StructuralValidator, ValidationIssue,
};
use crate::xml;
use crate::{Error, Result};
use bitflags::bitflags;
use chrono::NaiveDate;
use log::{debug, info, warn};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

#[cfg(feature = "parallel")]
use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileRole {
    Schema,
    Calculation,
    Definition,
    Label,
    Presentation,
    Instance,
}

impl FileRole {
    pub const ALL: [FileRole; 6] = [
        FileRole::Schema,
        FileRole::Calculation,
        FileRole::Definition,
        FileRole::Label,
        FileRole::Presentation,
        FileRole::Instance,
    ];

    /// Every role except the instance document.
    pub const OPTIONAL: [FileRole; 5] = [
        FileRole::Schema,
        FileRole::Calculation,
        FileRole::Definition,
        FileRole::Label,
        FileRole::Presentation,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FileRole::Schema => "schema",
            FileRole::Calculation => "calculation",
            FileRole::Definition => "definition",
            FileRole::Label => "label",
            FileRole::Presentation => "presentation",
            FileRole::Instance => "instance",
        }
    }

    /// Conventional file-name suffix for the role.
    pub fn suffix(self) -> &'static str {
        match self {
            FileRole::Schema => ".xsd",
            FileRole::Instance => "_htm.xml",
            other => other.linkbase_kind().map(LinkbaseKind::suffix).unwrap_or(".xml"),
        }
    }

    pub fn flag(self) -> DocumentSet {
        match self {
            FileRole::Schema => DocumentSet::SCHEMA,
            FileRole::Calculation => DocumentSet::CALCULATION,
            FileRole::Definition => DocumentSet::DEFINITION,
            FileRole::Label => DocumentSet::LABEL,
            FileRole::Presentation => DocumentSet::PRESENTATION,
            FileRole::Instance => DocumentSet::INSTANCE,
        }
    }

    pub fn linkbase_kind(self) -> Option<LinkbaseKind> {
        match self {
            FileRole::Calculation => Some(LinkbaseKind::Calculation),
            FileRole::Definition => Some(LinkbaseKind::Definition),
            FileRole::Label => Some(LinkbaseKind::Label),
            FileRole::Presentation => Some(LinkbaseKind::Presentation),
            FileRole::Schema | FileRole::Instance => None,
        }
    }

    pub fn from_linkbase(kind: LinkbaseKind) -> Self {
        match kind {
            LinkbaseKind::Calculation => FileRole::Calculation,
            LinkbaseKind::Definition => FileRole::Definition,
            LinkbaseKind::Label => FileRole::Label,
            LinkbaseKind::Presentation => FileRole::Presentation,
        }
    }

    /// Schema or linkbase role implied by a file name; instances are never classified here.
    pub fn classify(file_name: &str) -> Option<Self> {
        let lower = file_name.to_lowercase();
        if lower.ends_with(".xsd") {
            return Some(FileRole::Schema);
        }
        LinkbaseKind::from_file_name(&lower).map(FileRole::from_linkbase)
    }
}

impl fmt::Display for FileRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

bitflags! {
    /// Set of document roles, e.g. the ones actually parsed for a filing.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct DocumentSet: u8 {
        const SCHEMA = 1;
        const CALCULATION = 1 << 1;
        const DEFINITION = 1 << 2;
        const LABEL = 1 << 3;
        const PRESENTATION = 1 << 4;
        const INSTANCE = 1 << 5;
    }
}

impl DocumentSet {
    pub fn roles(self) -> impl Iterator<Item = FileRole> {
        FileRole::ALL
            .into_iter()
            .filter(move |role| self.contains(role.flag()))
    }
}

/// Role to path mapping for one filing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilingFiles {
    files: BTreeMap<FileRole, PathBuf>,
}

impl FilingFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, role: FileRole, path: impl Into<PathBuf>) -> Self {
        self.insert(role, path);
        self
    }

    pub fn insert(&mut self, role: FileRole, path: impl Into<PathBuf>) {
        self.files.insert(role, path.into());
    }

    pub fn get(&self, role: FileRole) -> Option<&Path> {
        self.files.get(&role).map(PathBuf::as_path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (FileRole, &Path)> {
        self.files.iter().map(|(role, path)| (*role, path.as_path()))
    }

    pub fn present(&self) -> DocumentSet {
        self.files
            .keys()
            .fold(DocumentSet::empty(), |set, role| set | role.flag())
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Classifies a directory's files by suffix; the instance is the first
    /// `_htm.xml` file, else the first unclassified `.xml` file.
    pub fn from_directory<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file())
            .collect();
        paths.sort();

        let mut files = FilingFiles::new();
        let mut unclassified = Vec::new();
        for path in paths {
            let Some(name) = path.file_name().map(|n| n.to_string_lossy().to_lowercase()) else {
                continue;
            };
            match FileRole::classify(&name) {
                Some(role) => {
                    files.files.entry(role).or_insert(path);
                }
                None if name.ends_with(".xml") => unclassified.push((name, path)),
                None => {}
            }
        }

        let instance = unclassified
            .iter()
            .position(|(name, _)| name.ends_with(FileRole::Instance.suffix()))
            .or_else(|| (!unclassified.is_empty()).then_some(0));
        if let Some(index) = instance {
            let (_, path) = unclassified.swap_remove(index);
            files.insert(FileRole::Instance, path);
        }

        info!(
            "Discovered {} filing document(s) in {}",
            files.len(),
            dir.display()
        );
        Ok(files)
    }
}

pub type ProgressCallback = Box<dyn Fn(&str, f64) + Send + Sync>;

enum ParsedDocument {
    Schema(SchemaDocument),
    Linkbase(Linkbases),
    Instance(InstanceDocument),
}

struct Parsed {
    document: ParsedDocument,
    issues: Vec<ValidationIssue>,
}

type Outcome = (FileRole, PathBuf, Result<Parsed>);

pub struct FilingParser {
    config: Config,
    progress: Option<ProgressCallback>,
}

impl Default for FilingParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FilingParser {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            progress: None,
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str, f64) + Send + Sync + 'static,
    {
        self.progress = Some(Box::new(callback));
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn parse_directory<P: AsRef<Path>>(&self, dir: P) -> Result<FilingData> {
        let files = FilingFiles::from_directory(dir)?;
        self.parse(&files)
    }

    /// A directory is discovered; a single file is taken as the instance.
    pub fn parse_path<P: AsRef<Path>>(&self, path: P) -> Result<FilingData> {
        let path = path.as_ref();
        if path.is_dir() {
            self.parse_directory(path)
        } else {
            self.parse(&FilingFiles::new().with(FileRole::Instance, path))
        }
    }

    pub fn parse(&self, files: &FilingFiles) -> Result<FilingData> {
        let start = Instant::now();
        self.config.validate()?;
        self.report_progress("checking inputs", 0.0);

        let structural = StructuralValidator::from_config(&self.config);
        let mut structural_report = structural.check_presence(files)?;

        let mut files = files.clone();
        let mut outcomes = Vec::new();
        if let Some(schema_path) = files.get(FileRole::Schema).map(Path::to_path_buf) {
            let linkbases_missing = LinkbaseKind::ALL
                .into_iter()
                .any(|kind| files.get(FileRole::from_linkbase(kind)).is_none());
            if linkbases_missing {
                let outcome = self.parse_document(FileRole::Schema, &schema_path);
                if let Ok(Parsed {
                    document: ParsedDocument::Schema(schema),
                    ..
                }) = &outcome
                {
                    discover_linkbases(&mut files, schema, &schema_path);
                }
                outcomes.push((FileRole::Schema, schema_path, outcome));
            }
        }

        let tasks: Vec<(FileRole, PathBuf)> = files
            .iter()
            .filter(|(role, _)| !outcomes.iter().any(|(done, _, _)| done == role))
            .map(|(role, path)| (role, path.to_path_buf()))
            .collect();
        self.report_progress("parsing documents", 0.1);
        outcomes.extend(self.run_tasks(tasks));
        outcomes.sort_by_key(|(role, _, _)| *role);

        self.report_progress("merging documents", 0.6);
        let mut schema = None;
        let mut linkbases = Linkbases::default();
        let mut instance = None;
        let mut documents = DocumentSet::empty();
        for (role, path, outcome) in outcomes {
            let parsed = match outcome {
                Ok(parsed) => parsed,
                Err(err) => {
                    degrade_or_fail(role, &path, err)?;
                    continue;
                }
            };
            documents |= role.flag();
            structural_report.record(role, parsed.issues);
            match parsed.document {
                ParsedDocument::Schema(doc) => schema = Some(doc),
                ParsedDocument::Linkbase(links) => linkbases.merge(links),
                ParsedDocument::Instance(doc) => {
                    structural_report.facts_checked += doc.facts.len();
                    instance = Some(doc);
                }
            }
        }
        structural_report.missing = FileRole::OPTIONAL
            .into_iter()
            .filter(|role| !documents.contains(role.flag()))
            .collect();
        structural_report
            .issues
            .retain(|issue| !matches!(issue, ValidationIssue::MissingDocument { .. }));
        let missing_issues: Vec<ValidationIssue> = structural_report
            .missing
            .iter()
            .map(|&role| ValidationIssue::MissingDocument { role })
            .collect();
        structural_report.issues.splice(0..0, missing_issues);

        let instance = instance.ok_or_else(|| {
            Error::data_validation("file_completeness", "instance document was not parsed")
        })?;

        let mut filing = self.assemble(instance, schema, linkbases, documents);

        self.report_progress("validating", 0.8);
        if self.config.structural_validation {
            if !structural_report.is_clean() {
                warn!(
                    "Structural validation found {} issue(s)",
                    structural_report.warning_count()
                );
            }
            filing.structural_report = Some(structural_report);
        }

        let quality = DataValidator::from_config(&self.config).report(&filing)?;
        filing.quality_report = Some(quality);

        let calculations = CalculationValidator::from_config(&self.config).validate_filing(&filing);
        if self.config.strict_validation && !self.config.allow_calculation_errors {
            calculations.enforce(self.config.critical_error_ceiling)?;
        }
        filing.calculation_report = Some(calculations);

        self.report_progress("done", 1.0);
        info!(
            "Parsed filing for {}: {} facts, {} statements in {:?}",
            filing.company.name,
            filing.facts.len(),
            filing.statements().count(),
            start.elapsed()
        );
        Ok(filing)
    }

    fn report_progress(&self, stage: &str, fraction: f64) {
        debug!("Progress {:>3.0}%: {}", fraction * 100.0, stage);
        if let Some(callback) = &self.progress {
            callback(stage, fraction);
        }
    }

    fn parse_document(&self, role: FileRole, path: &Path) -> Result<Parsed> {
        let start = Instant::now();
        let root = xml::read_document(path, self.config.max_file_size)?;

        let issues = if self.config.structural_validation {
            StructuralValidator::from_config(&self.config).check_document(role, path, &root)
        } else {
            Vec::new()
        };

        let document = match role {
            FileRole::Schema => ParsedDocument::Schema(SchemaParser::new().parse_element(&root)),
            FileRole::Instance => ParsedDocument::Instance(
                InstanceParser::new().parse_element(&root, &path.display().to_string())?,
            ),
            linkbase => {
                let kind = linkbase
                    .linkbase_kind()
                    .ok_or_else(|| Error::parsing(path.display().to_string(), "unknown document role"))?;
                ParsedDocument::Linkbase(LinkbaseParser::new().parse_element(kind, &root))
            }
        };

        debug!("Parsed {} {} in {:?}", role, path.display(), start.elapsed());
        Ok(Parsed { document, issues })
    }

    fn run_tasks(&self, tasks: Vec<(FileRole, PathBuf)>) -> Vec<Outcome> {
        if self.config.enable_parallel_processing && tasks.len() > 1 {
            if let Some(outcomes) = self.run_parallel(&tasks) {
                return outcomes;
            }
        }
        tasks
            .into_iter()
            .map(|(role, path)| {
                let outcome = self.parse_document(role, &path);
                (role, path, outcome)
            })
            .collect()
    }

    #[cfg(feature = "parallel")]
    fn run_parallel(&self, tasks: &[(FileRole, PathBuf)]) -> Option<Vec<Outcome>> {
        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.max_worker_threads)
            .build()
        {
            Ok(pool) => pool,
            Err(e) => {
                warn!("Falling back to sequential parsing: {}", e);
                return None;
            }
        };

        let outcomes = Mutex::new(Vec::with_capacity(tasks.len()));
        pool.scope(|scope| {
            for (role, path) in tasks {
                let outcomes = &outcomes;
                scope.spawn(move |_| {
                    let outcome = self.parse_document(*role, path);
                    outcomes.lock().push((*role, path.clone(), outcome));
                });
            }
        });
        Some(outcomes.into_inner())
    }

    #[cfg(not(feature = "parallel"))]
    fn run_parallel(&self, _tasks: &[(FileRole, PathBuf)]) -> Option<Vec<Outcome>> {
        None
    }

    fn assemble(
        &self,
        instance: InstanceDocument,
        schema: Option<SchemaDocument>,
        linkbases: Linkbases,
        documents: DocumentSet,
    ) -> FilingData {
        let InstanceDocument {
            contexts,
            units,
            mut facts,
            company,
            dropped_facts,
            ..
        } = instance;
        if dropped_facts > 0 {
            warn!("{} fact(s) dropped for unresolvable contexts", dropped_facts);
        }

        for fact in &mut facts {
            fact.label = linkbases
                .labels
                .label_or_default(&fact.concept, STANDARD_LABEL);
        }

        let period_end = company
            .document_period_end
            .or_else(|| facts.iter().filter_map(|f| f.period_end).max());

        let (statements, canonical) = build_statements(&company.name, period_end, &facts, &linkbases);

        let mut filing = FilingData {
            company,
            filing_date: period_end,
            period_end,
            facts,
            taxonomy: schema.map(|s| s.elements).unwrap_or_default(),
            contexts,
            units,
            linkbases,
            documents,
            canonical: OnceCell::with_value(canonical),
            ..FilingData::default()
        };
        for statement in statements {
            let kind = statement.statement_type;
            *filing.statement_slot(kind) = Some(statement);
        }
        filing
    }
}

fn build_statements(
    company_name: &str,
    period_end: Option<NaiveDate>,
    facts: &[Fact],
    linkbases: &Linkbases,
) -> (Vec<FinancialStatement>, CanonicalIndex) {
    let mapper = ContextMapper::new(facts);
    let inputs = StatementInputs {
        company_name,
        period_end,
        facts,
        contexts: &mapper,
        calculations: &linkbases.calculations,
        presentations: &linkbases.presentations,
        labels: &linkbases.labels,
    };
    let statements = StatementType::ALL
        .into_iter()
        .map(|kind| builder_for(kind).build(&inputs))
        .filter(|statement| !statement.is_empty())
        .collect();
    (statements, mapper.canonical_index())
}

fn discover_linkbases(files: &mut FilingFiles, schema: &SchemaDocument, schema_path: &Path) {
    let dir = schema_path.parent().unwrap_or_else(|| Path::new("."));
    for (kind, path) in schema.linkbase_files(dir) {
        let role = FileRole::from_linkbase(kind);
        if files.get(role).is_none() {
            info!("Discovered {} linkbase {} from schema", kind.name(), path.display());
            files.insert(role, path);
        }
    }
}

/// Optional documents that cannot be read degrade the filing; malformed or
/// oversized ones, and any instance failure, abort the parse.
fn degrade_or_fail(role: FileRole, path: &Path, err: Error) -> Result<()> {
    match err {
        Error::Io(io) if role != FileRole::Instance => {
            warn!(
                "Skipping unreadable {} document {}: {}",
                role,
                path.display(),
                io
            );
            Ok(())
        }
        err => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    #[test]
    fn test_role_classification() {
        assert_eq!(FileRole::classify("acme-20241231.xsd"), Some(FileRole::Schema));
        assert_eq!(FileRole::classify("ACME-20241231_CAL.XML"), Some(FileRole::Calculation));
        assert_eq!(FileRole::classify("acme-20241231_pre.xml"), Some(FileRole::Presentation));
        assert_eq!(FileRole::classify("acme-20241231_htm.xml"), None);
        assert_eq!(FileRole::Label.suffix(), "_lab.xml");
        assert_eq!(FileRole::Instance.to_string(), "instance");
    }

    #[test]
    fn test_document_set_roles() {
        let set = FileRole::Schema.flag() | FileRole::Instance.flag();
        assert_eq!(set.roles().collect::<Vec<_>>(), vec![FileRole::Schema, FileRole::Instance]);
        assert!(serde_json::to_string(&set).unwrap().contains("INSTANCE"));
    }

    #[test]
    fn test_directory_discovery_prefers_htm_instance() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "FilingSummary.xml",
            "acme-20241231.xsd",
            "acme-20241231_cal.xml",
            "acme-20241231_htm.xml",
            "acme-20241231_lab.xml",
            "notes.txt",
        ] {
            fs::write(dir.path().join(name), "<x/>").unwrap();
        }

        let files = FilingFiles::from_directory(dir.path()).unwrap();
        assert_eq!(files.len(), 4);
        assert_eq!(
            files.get(FileRole::Instance).unwrap().file_name().unwrap(),
            "acme-20241231_htm.xml"
        );
        assert!(files.get(FileRole::Presentation).is_none());
        assert_eq!(
            files.present(),
            DocumentSet::SCHEMA | DocumentSet::CALCULATION | DocumentSet::LABEL | DocumentSet::INSTANCE
        );
    }

    #[test]
    fn test_directory_discovery_falls_back_to_first_xml() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b-instance.xml"), "<x/>").unwrap();
        fs::write(dir.path().join("a-instance.xml"), "<x/>").unwrap();

        let files = FilingFiles::from_directory(dir.path()).unwrap();
        assert_eq!(
            files.get(FileRole::Instance).unwrap().file_name().unwrap(),
            "a-instance.xml"
        );
    }

    #[test]
    fn test_io_errors_degrade_only_optional_documents() {
        let io = || Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert!(degrade_or_fail(FileRole::Label, Path::new("x_lab.xml"), io()).is_ok());
        assert!(degrade_or_fail(FileRole::Instance, Path::new("x_htm.xml"), io()).is_err());
        let parsing = Error::parsing("x_cal.xml", "unclosed element");
        assert!(degrade_or_fail(FileRole::Calculation, Path::new("x_cal.xml"), parsing).is_err());
    }
}
