//! Problem records and the problem-store contract.
//!
//! The store is an external collaborator: the core only needs
//! lookup-by-id. `JsonProblemStore` serves problems from the seed file
//! the backend ships with; nothing in this subsystem mutates it.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::JudgeError;

/// Delimiter joining list-valued inputs into one process argument.
pub const LIST_DELIMITER: char = ',';

/// A single scalar test-case value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::Float(x) => write!(f, "{}", x),
            Scalar::Text(s) => write!(f, "{}", s),
        }
    }
}

/// A test-case value at the boundary: either one scalar or a list of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputValue {
    List(Vec<Scalar>),
    Scalar(Scalar),
}

impl InputValue {
    /// Serialize this value into one process argument.
    ///
    /// Scalars render via their text representation. Lists join their
    /// rendered elements with [`LIST_DELIMITER`]; an element containing
    /// the delimiter itself is rejected rather than producing an
    /// argument the submission cannot split back unambiguously.
    pub fn to_argument(&self) -> Result<String, JudgeError> {
        match self {
            InputValue::Scalar(s) => Ok(s.to_string()),
            InputValue::List(items) => {
                let mut rendered = Vec::with_capacity(items.len());
                for item in items {
                    let text = item.to_string();
                    if text.contains(LIST_DELIMITER) {
                        return Err(JudgeError::InvalidInput(format!(
                            "list element {:?} contains the {:?} delimiter",
                            text, LIST_DELIMITER
                        )));
                    }
                    rendered.push(text);
                }
                Ok(rendered.join(&LIST_DELIMITER.to_string()))
            }
        }
    }

    /// Render the value as expected-output text.
    ///
    /// Lists join with single spaces, which is what the stored answers
    /// compare against after whitespace normalization.
    pub fn render_expected(&self) -> String {
        match self {
            InputValue::Scalar(s) => s.to_string(),
            InputValue::List(items) => items
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

/// One stored test case of a problem.
///
/// Inputs are keyed by name; `BTreeMap` keeps the flattening order
/// deterministic across runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    #[serde(rename = "testcaseid", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub input: BTreeMap<String, InputValue>,
    pub output: InputValue,
}

/// A problem record; immutable once loaded for a validation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Problem {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub difficulty: String,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
}

/// Shape of the problem-seed file.
#[derive(Debug, Deserialize)]
struct ProblemsFile {
    problems: Vec<Problem>,
}

/// Lookup-by-id contract consumed by the test harness.
#[async_trait]
pub trait ProblemStore: Send + Sync {
    /// Resolve a problem by id. `Ok(None)` when no such problem exists.
    async fn find_by_id(&self, id: i64) -> Result<Option<Problem>>;
}

/// Problem store backed by the JSON seed file, held in memory.
pub struct JsonProblemStore {
    problems: HashMap<i64, Problem>,
}

impl JsonProblemStore {
    /// Load the seed file (`{ "problems": [...] }`).
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Cannot open problems file {:?}", path))?;
        let store = Self::from_json(&content)?;
        info!("Loaded {} problems from {:?}", store.problems.len(), path);
        Ok(store)
    }

    /// Parse the seed file contents.
    pub fn from_json(content: &str) -> Result<Self> {
        let file: ProblemsFile =
            serde_json::from_str(content).context("Failed to parse problems file")?;
        Ok(Self::from_problems(file.problems))
    }

    pub fn from_problems(problems: Vec<Problem>) -> Self {
        let problems = problems.into_iter().map(|p| (p.id, p)).collect();
        Self { problems }
    }
}

#[async_trait]
impl ProblemStore for JsonProblemStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<Problem>> {
        Ok(self.problems.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEED: &str = r#"
    {
        "problems": [
            {
                "id": 1,
                "title": "Sum of a list",
                "description": "Print the sum of the numbers.",
                "difficulty": "easy",
                "test_cases": [
                    { "input": { "nums": [1, 2, 3] }, "output": 6 },
                    { "testcaseid": 2, "input": { "nums": [10, -4] }, "output": 6 }
                ]
            }
        ]
    }
    "#;

    #[test]
    fn parses_seed_file_shape() {
        let store = JsonProblemStore::from_json(SEED).unwrap();
        let problem = store.problems.get(&1).unwrap();
        assert_eq!(problem.test_cases.len(), 2);
        assert_eq!(problem.test_cases[0].id, None);
        assert_eq!(problem.test_cases[1].id, Some(2));
        assert_eq!(
            problem.test_cases[0].input["nums"],
            InputValue::List(vec![Scalar::Int(1), Scalar::Int(2), Scalar::Int(3)])
        );
        assert_eq!(
            problem.test_cases[0].output,
            InputValue::Scalar(Scalar::Int(6))
        );
    }

    #[tokio::test]
    async fn find_by_id_misses_cleanly() {
        let store = JsonProblemStore::from_json(SEED).unwrap();
        assert!(store.find_by_id(1).await.unwrap().is_some());
        assert!(store.find_by_id(999).await.unwrap().is_none());
    }

    #[test]
    fn scalar_arguments_render_as_text() {
        assert_eq!(
            InputValue::Scalar(Scalar::Int(42)).to_argument().unwrap(),
            "42"
        );
        assert_eq!(
            InputValue::Scalar(Scalar::Text("abc".into()))
                .to_argument()
                .unwrap(),
            "abc"
        );
        assert_eq!(
            InputValue::Scalar(Scalar::Bool(true)).to_argument().unwrap(),
            "true"
        );
    }

    #[test]
    fn list_arguments_join_with_commas() {
        let value = InputValue::List(vec![Scalar::Int(1), Scalar::Int(2), Scalar::Int(3)]);
        assert_eq!(value.to_argument().unwrap(), "1,2,3");
    }

    #[test]
    fn delimiter_collision_is_rejected() {
        let value = InputValue::List(vec![Scalar::Text("a,b".into()), Scalar::Text("c".into())]);
        let err = value.to_argument().unwrap_err();
        assert!(matches!(err, JudgeError::InvalidInput(_)));
    }

    #[test]
    fn expected_output_rendering() {
        assert_eq!(InputValue::Scalar(Scalar::Int(6)).render_expected(), "6");
        let list = InputValue::List(vec![Scalar::Int(1), Scalar::Int(2), Scalar::Int(3)]);
        assert_eq!(list.render_expected(), "1 2 3");
    }
}
