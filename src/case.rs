//! Test case model and catalogue
//!
//! Catalogue records are deserialized once into [`RawRecord`] and resolved
//! into immutable [`TestCase`] values with every default filled in. Nothing
//! downstream looks at the raw record again.

use std::path::Path;
use std::time::Duration;
use regex::Regex;
use serde::Deserialize;
use crate::error::LoadError;

/// Prefix of input names that deliberately do not exist
pub const MISSING_SENTINEL_PREFIX: &str = "file_that_probably_doesnt_exist";

/// Input name that deliberately refers to a directory
pub const UNREADABLE_SENTINEL: &str = ".";

/// One declared input operand
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputPath {
    /// An ordinary file that the harness can read
    Regular(String),
    /// A name that is expected not to exist
    Missing(String),
    /// A name that exists but cannot be read as a file
    Unreadable(String),
}

impl InputPath {
    /// Classify a catalogue entry by name alone
    pub fn classify(name: &str) -> Self {
        if name.starts_with(MISSING_SENTINEL_PREFIX) {
            InputPath::Missing(name.to_string())
        } else if name == UNREADABLE_SENTINEL {
            InputPath::Unreadable(name.to_string())
        } else {
            InputPath::Regular(name.to_string())
        }
    }

    /// The operand as it appears on the command line
    pub fn as_str(&self) -> &str {
        match self {
            InputPath::Regular(s) | InputPath::Missing(s) | InputPath::Unreadable(s) => s,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        !matches!(self, InputPath::Regular(_))
    }
}

/// A file the tool is expected to create, with its exact content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedFile {
    pub name: String,
    pub content: Vec<u8>,
}

/// A fully resolved test case
#[derive(Debug, Clone, PartialEq)]
pub struct TestCase {
    pub name: String,
    pub options: Vec<String>,
    /// Command-language payload, passed through unparsed
    pub cmdline: Option<String>,
    pub inputs: Vec<InputPath>,
    pub expected_exit: i32,
    pub expected_stdout: Vec<u8>,
    /// stderr must be non-empty regardless of exit code
    pub expects_error_message: bool,
    pub outputs: Vec<ExpectedFile>,
    pub timeout: Option<Duration>,
    pub stdin_applicable: bool,
    pub script_applicable: bool,
}

impl TestCase {
    /// A case with the given name and expected stdout, everything else default
    pub fn new(name: impl Into<String>, expected_stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            options: Vec::new(),
            cmdline: None,
            inputs: Vec::new(),
            expected_exit: 0,
            expected_stdout: expected_stdout.into(),
            expects_error_message: false,
            outputs: Vec::new(),
            timeout: None,
            stdin_applicable: true,
            script_applicable: true,
        }
    }

    pub fn cmdline(mut self, cmdline: impl Into<String>) -> Self {
        self.cmdline = Some(cmdline.into());
        self
    }

    pub fn option(mut self, flag: impl Into<String>) -> Self {
        self.options.push(flag.into());
        self
    }

    pub fn input(mut self, name: &str) -> Self {
        self.inputs.push(InputPath::classify(name));
        self
    }

    pub fn exit(mut self, code: i32) -> Self {
        self.expected_exit = code;
        self
    }

    pub fn error_message(mut self) -> Self {
        self.expects_error_message = true;
        self
    }

    pub fn output(mut self, name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        self.outputs.push(ExpectedFile {
            name: name.into(),
            content: content.into(),
        });
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn no_stdin(mut self) -> Self {
        self.stdin_applicable = false;
        self
    }

    pub fn no_script(mut self) -> Self {
        self.script_applicable = false;
        self
    }
}

/// A catalogue record exactly as it is stored on disk
#[derive(Debug, Deserialize)]
pub struct RawRecord {
    pub name: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub cmdline: Option<String>,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub expectederr: i32,
    pub expectedout: String,
    #[serde(default)]
    pub shouldprinterr: bool,
    #[serde(default)]
    pub newfilenames: Vec<String>,
    #[serde(default)]
    pub newfilecontents: Vec<String>,
    #[serde(default)]
    pub timeout: Option<f64>,
    #[serde(default)]
    pub stdin_test_not_applicable: bool,
    #[serde(default)]
    pub script_test_not_applicable: bool,
}

impl RawRecord {
    /// Resolve defaults and validate. `index` is only used in messages.
    pub fn resolve(self, index: usize) -> Result<TestCase, LoadError> {
        if self.newfilenames.len() != self.newfilecontents.len() {
            return Err(LoadError::UnpairedOutputs {
                index,
                name: self.name,
                count_names: self.newfilenames.len(),
                count_contents: self.newfilecontents.len(),
            });
        }

        let timeout = match self.timeout {
            None => None,
            Some(secs) => match Duration::try_from_secs_f64(secs) {
                Ok(d) => Some(d),
                Err(_) => {
                    return Err(LoadError::InvalidTimeout {
                        index,
                        name: self.name,
                        value: secs,
                    })
                }
            },
        };

        let outputs = self.newfilenames.into_iter()
            .zip(self.newfilecontents)
            .map(|(name, content)| ExpectedFile { name, content: content.into_bytes() })
            .collect();

        Ok(TestCase {
            name: self.name,
            options: self.options,
            cmdline: self.cmdline,
            inputs: self.files.iter().map(|f| InputPath::classify(f)).collect(),
            expected_exit: self.expectederr,
            expected_stdout: self.expectedout.into_bytes(),
            expects_error_message: self.shouldprinterr,
            outputs,
            timeout,
            stdin_applicable: !self.stdin_test_not_applicable,
            script_applicable: !self.script_test_not_applicable,
        })
    }
}

/// The immutable, ordered set of test cases for one session
#[derive(Debug, Clone, Default)]
pub struct Catalogue {
    cases: Vec<TestCase>,
}

impl Catalogue {
    /// Wrap already-built cases
    pub fn from_cases(cases: Vec<TestCase>) -> Self {
        Self { cases }
    }

    /// Parse a JSON array of records
    pub fn from_json(text: &str) -> Result<Self, LoadError> {
        let records: Vec<RawRecord> = serde_json::from_str(text)?;
        let cases = records.into_iter()
            .enumerate()
            .map(|(i, r)| r.resolve(i))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { cases })
    }

    /// Read and parse a catalogue file
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let text = std::fs::read_to_string(path).map_err(|source| LoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let catalogue = Self::from_json(&text)?;
        tracing::debug!(path = %path.display(), cases = catalogue.len(), "catalogue loaded");
        Ok(catalogue)
    }

    /// Keep only cases whose name matches `pattern`, preserving order
    pub fn filtered(&self, pattern: &Regex) -> Self {
        Self {
            cases: self.cases.iter()
                .filter(|c| pattern.is_match(&c.name))
                .cloned()
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&TestCase> {
        self.cases.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TestCase> {
        self.cases.iter()
    }

    pub fn cases(&self) -> &[TestCase] {
        &self.cases
    }
}

impl<'a> IntoIterator for &'a Catalogue {
    type Item = &'a TestCase;
    type IntoIter = std::slice::Iter<'a, TestCase>;

    fn into_iter(self) -> Self::IntoIter {
        self.cases.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_sentinels() {
        assert_eq!(
            InputPath::classify("file_that_probably_doesnt_exist"),
            InputPath::Missing("file_that_probably_doesnt_exist".into())
        );
        assert_eq!(
            InputPath::classify("file_that_probably_doesnt_exist2"),
            InputPath::Missing("file_that_probably_doesnt_exist2".into())
        );
        assert_eq!(InputPath::classify("."), InputPath::Unreadable(".".into()));
        assert_eq!(InputPath::classify("a.txt"), InputPath::Regular("a.txt".into()));
        assert!(!InputPath::classify("./a.txt").is_sentinel());
    }

    #[test]
    fn test_defaults_resolved_at_load() {
        let cat = Catalogue::from_json(r#"[{"name": "print", "expectedout": "hi"}]"#).unwrap();
        let case = cat.get(0).unwrap();
        assert_eq!(case.name, "print");
        assert_eq!(case.expected_exit, 0);
        assert_eq!(case.expected_stdout, b"hi");
        assert!(case.cmdline.is_none());
        assert!(case.inputs.is_empty());
        assert!(case.outputs.is_empty());
        assert!(case.timeout.is_none());
        assert!(case.stdin_applicable);
        assert!(case.script_applicable);
        assert!(!case.expects_error_message);
    }

    #[test]
    fn test_full_record() {
        let json = r#"[{
            "name": "write",
            "options": ["-n"],
            "cmdline": "w out.txt",
            "files": ["a.txt", "file_that_probably_doesnt_exist", "."],
            "expectederr": 3,
            "expectedout": "",
            "shouldprinterr": true,
            "newfilenames": ["out.txt"],
            "newfilecontents": ["hi"],
            "timeout": 1.5,
            "stdin_test_not_applicable": true,
            "script_test_not_applicable": true
        }]"#;
        let cat = Catalogue::from_json(json).unwrap();
        let case = &cat.cases()[0];
        assert_eq!(case.options, vec!["-n"]);
        assert_eq!(case.cmdline.as_deref(), Some("w out.txt"));
        assert_eq!(case.inputs.len(), 3);
        assert!(case.inputs[1].is_sentinel());
        assert!(case.inputs[2].is_sentinel());
        assert_eq!(case.expected_exit, 3);
        assert!(case.expects_error_message);
        assert_eq!(case.outputs, vec![ExpectedFile { name: "out.txt".into(), content: b"hi".to_vec() }]);
        assert_eq!(case.timeout, Some(Duration::from_millis(1500)));
        assert!(!case.stdin_applicable);
        assert!(!case.script_applicable);
    }

    #[test]
    fn test_unpaired_outputs_rejected() {
        let json = r#"[{"name": "w", "expectedout": "", "newfilenames": ["a", "b"], "newfilecontents": ["x"]}]"#;
        let err = Catalogue::from_json(json).unwrap_err();
        assert!(matches!(err, LoadError::UnpairedOutputs { index: 0, count_names: 2, count_contents: 1, .. }));
    }

    #[test]
    fn test_negative_timeout_rejected() {
        let json = r#"[{"name": "t", "expectedout": "", "timeout": -1}]"#;
        assert!(matches!(
            Catalogue::from_json(json).unwrap_err(),
            LoadError::InvalidTimeout { .. }
        ));
    }

    #[test]
    fn test_missing_expectedout_is_parse_error() {
        let err = Catalogue::from_json(r#"[{"name": "x"}]"#).unwrap_err();
        assert!(matches!(err, LoadError::Parse(_)));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(Catalogue::from_json("{not json").unwrap_err(), LoadError::Parse(_)));
        assert!(matches!(Catalogue::from_json(r#"{"name": "x"}"#).unwrap_err(), LoadError::Parse(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Catalogue::load(&dir.path().join("testcases.json")).unwrap_err();
        assert!(matches!(err, LoadError::Read { .. }));
    }

    #[test]
    fn test_filtered_keeps_order() {
        let cat = Catalogue::from_cases(vec![
            TestCase::new("print one", ""),
            TestCase::new("delete", ""),
            TestCase::new("print two", ""),
        ]);
        let only = cat.filtered(&Regex::new("^print").unwrap());
        let names: Vec<_> = only.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["print one", "print two"]);
    }
}
