//! Test harness - testcase-driven validation of one submission
//!
//! Resolves a problem, compiles the submission once, and runs it once
//! per stored test case, aggregating per-case outcomes into a verdict.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::JudgeError;
use crate::problems::ProblemStore;
use crate::runner::{
    truncate_chars, RunLimits, RunStatus, SandboxRunner, Submission, MAX_DIAGNOSTIC_CHARS,
};

/// Preview of a case's actual output carried in the verdict.
const OUTPUT_PREVIEW_CHARS: usize = 4096;

/// Outcome of one test case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Passed,
    WrongAnswer,
    RuntimeError,
    Timeout,
    ResourceExceeded,
    Skipped,
}

/// Per-case result inside a verdict
#[derive(Debug, Clone, Serialize)]
pub struct CaseResult {
    pub testcase_id: i64,
    pub status: CaseStatus,
    /// Actual program output (truncated), when the program produced any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Failure detail: stderr, or why the case was skipped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Aggregate verdict over all test cases of a validation run
#[derive(Debug, Serialize)]
pub struct Verdict {
    pub problem_id: i64,
    /// True only when every case passed; vacuously true for a problem
    /// with no test cases.
    pub passed: bool,
    pub cases: Vec<CaseResult>,
    /// Compile diagnostics when the whole run was short-circuited
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Validate a submission against a problem's stored test cases.
///
/// The submission is compiled once and the artifact is reused across
/// cases; only the run step is per-case. A failing case is recorded
/// and never aborts the loop, except for a compile error, which
/// short-circuits the whole run.
pub async fn validate(
    store: &dyn ProblemStore,
    problem_id: i64,
    submission: &Submission,
) -> Result<Verdict, JudgeError> {
    let problem = store
        .find_by_id(problem_id)
        .await
        .context("Problem lookup failed")?
        .ok_or(JudgeError::ProblemNotFound(problem_id))?;

    info!(
        "Validating submission against problem {} ({} cases)",
        problem_id,
        problem.test_cases.len()
    );

    let runner = SandboxRunner::new(submission, RunLimits::default())
        .await
        .context("Failed to prepare workspace")?;

    // Compile once per submission; the same error would recur per case.
    let compiled = runner.compile().await.context("Compiler invocation failed")?;
    if !compiled.success {
        let diagnostics = compiled.message.unwrap_or_else(|| "Compilation failed".into());
        return Ok(Verdict {
            problem_id,
            passed: false,
            cases: vec![],
            error_message: Some(truncate_chars(diagnostics, MAX_DIAGNOSTIC_CHARS)),
        });
    }

    let mut cases = Vec::with_capacity(problem.test_cases.len());
    let mut passed = true;

    for (idx, tc) in problem.test_cases.iter().enumerate() {
        let case_id = tc.id.unwrap_or((idx + 1) as i64);

        // Flatten the named inputs into positional arguments, one per
        // input, ordered by name.
        let mut args = Vec::with_capacity(tc.input.len());
        let mut unencodable = None;
        for value in tc.input.values() {
            match value.to_argument() {
                Ok(arg) => args.push(arg),
                Err(e) => {
                    unencodable = Some(e.to_string());
                    break;
                }
            }
        }
        if let Some(reason) = unencodable {
            cases.push(CaseResult {
                testcase_id: case_id,
                status: CaseStatus::Skipped,
                output: None,
                message: Some(reason),
            });
            passed = false;
            continue;
        }

        let result = runner
            .run(&args)
            .await
            .with_context(|| format!("Execution failed for case {}", case_id))?;

        debug!(
            "Case {}: status={:?}, stdout={} bytes",
            case_id,
            result.status,
            result.stdout.len()
        );

        let output = if result.stdout.is_empty() {
            None
        } else {
            Some(truncate_chars(result.stdout.clone(), OUTPUT_PREVIEW_CHARS))
        };

        let case = match result.status {
            RunStatus::Success => {
                let expected = tc.output.render_expected();
                if compare_output(&result.stdout, &expected) {
                    CaseResult {
                        testcase_id: case_id,
                        status: CaseStatus::Passed,
                        output,
                        message: None,
                    }
                } else {
                    CaseResult {
                        testcase_id: case_id,
                        status: CaseStatus::WrongAnswer,
                        output,
                        message: Some(format!("expected {:?}", expected)),
                    }
                }
            }
            RunStatus::RuntimeError => CaseResult {
                testcase_id: case_id,
                status: CaseStatus::RuntimeError,
                output,
                message: non_empty(result.stderr),
            },
            RunStatus::Timeout => CaseResult {
                testcase_id: case_id,
                status: CaseStatus::Timeout,
                output: None,
                message: None,
            },
            RunStatus::ResourceExceeded => CaseResult {
                testcase_id: case_id,
                status: CaseStatus::ResourceExceeded,
                output: None,
                message: non_empty(result.stderr),
            },
            // The compile step already ran; reaching this is a bug in
            // the runner, surfaced as a skipped case rather than a 500.
            RunStatus::CompileError => CaseResult {
                testcase_id: case_id,
                status: CaseStatus::Skipped,
                output: None,
                message: non_empty(result.stderr),
            },
        };

        if case.status != CaseStatus::Passed {
            passed = false;
        }
        cases.push(case);
    }

    info!(
        "Validation finished: problem_id={}, passed={}, cases={}",
        problem_id,
        passed,
        cases.len()
    );

    Ok(Verdict {
        problem_id,
        passed,
        cases,
        error_message: None,
    })
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(truncate_chars(s, MAX_DIAGNOSTIC_CHARS))
    }
}

/// Compare program output with expected output.
///
/// Trailing whitespace per line and trailing blank lines are not
/// significant.
pub fn compare_output(actual: &str, expected: &str) -> bool {
    let normalize = |s: &str| -> Vec<String> {
        let mut lines: Vec<String> = s.lines().map(|line| line.trim_end().to_string()).collect();
        while lines.last().map(|l| l.is_empty()).unwrap_or(false) {
            lines.pop();
        }
        lines
    };

    normalize(actual) == normalize(expected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::languages::{init_languages, Language};
    use crate::problems::{InputValue, JsonProblemStore, Problem, Scalar, TestCase};
    use std::collections::BTreeMap;

    fn problem(id: i64, test_cases: Vec<TestCase>) -> Problem {
        Problem {
            id,
            title: String::new(),
            description: String::new(),
            difficulty: String::new(),
            test_cases,
        }
    }

    fn case(id: i64, nums: Vec<i64>, expected: i64) -> TestCase {
        let mut input = BTreeMap::new();
        input.insert(
            "nums".to_string(),
            InputValue::List(nums.into_iter().map(Scalar::Int).collect()),
        );
        TestCase {
            id: Some(id),
            input,
            output: InputValue::Scalar(Scalar::Int(expected)),
        }
    }

    fn scripted(source: &str) -> Submission {
        init_languages().unwrap();
        Submission {
            source: source.to_string(),
            language: Language::Scripted,
        }
    }

    const SUM_PY: &str = "import sys\nprint(sum(int(x) for x in sys.argv[1].split(',')))\n";

    #[tokio::test]
    async fn sum_submission_passes_its_cases() {
        let store =
            JsonProblemStore::from_problems(vec![problem(1, vec![case(1, vec![1, 2, 3], 6)])]);

        let verdict = validate(&store, 1, &scripted(SUM_PY)).await.unwrap();
        assert!(verdict.passed);
        assert_eq!(verdict.cases.len(), 1);
        assert_eq!(verdict.cases[0].status, CaseStatus::Passed);
        assert_eq!(verdict.cases[0].testcase_id, 1);
    }

    #[tokio::test]
    async fn wrong_answer_is_recorded_per_case() {
        let store = JsonProblemStore::from_problems(vec![problem(
            1,
            vec![case(1, vec![1, 2, 3], 6), case(2, vec![4, 4], 9)],
        )]);

        let verdict = validate(&store, 1, &scripted(SUM_PY)).await.unwrap();
        assert!(!verdict.passed);
        assert_eq!(verdict.cases[0].status, CaseStatus::Passed);
        assert_eq!(verdict.cases[1].status, CaseStatus::WrongAnswer);
        assert!(verdict.cases[1].message.as_deref().unwrap().contains("9"));
    }

    #[tokio::test]
    async fn a_failing_case_never_aborts_the_loop() {
        // First case feeds a non-numeric value so the submission raises;
        // the second case must still run and pass.
        let mut bad_input = BTreeMap::new();
        bad_input.insert(
            "nums".to_string(),
            InputValue::List(vec![Scalar::Text("x".into())]),
        );
        let bad = TestCase {
            id: Some(1),
            input: bad_input,
            output: InputValue::Scalar(Scalar::Int(0)),
        };

        let store =
            JsonProblemStore::from_problems(vec![problem(1, vec![bad, case(2, vec![2, 2], 4)])]);

        let verdict = validate(&store, 1, &scripted(SUM_PY)).await.unwrap();
        assert!(!verdict.passed);
        assert_eq!(verdict.cases[0].status, CaseStatus::RuntimeError);
        assert_eq!(verdict.cases[1].status, CaseStatus::Passed);
    }

    #[tokio::test]
    async fn unknown_problem_runs_nothing() {
        let store = JsonProblemStore::from_problems(vec![]);
        let err = validate(&store, 7, &scripted(SUM_PY)).await.unwrap_err();
        assert!(matches!(err, JudgeError::ProblemNotFound(7)));
    }

    #[tokio::test]
    async fn zero_test_cases_pass_vacuously() {
        let store = JsonProblemStore::from_problems(vec![problem(1, vec![])]);
        let verdict = validate(&store, 1, &scripted(SUM_PY)).await.unwrap();
        assert!(verdict.passed);
        assert!(verdict.cases.is_empty());
    }

    #[tokio::test]
    async fn compile_error_short_circuits_all_cases() {
        init_languages().unwrap();
        let store = JsonProblemStore::from_problems(vec![problem(
            1,
            vec![case(1, vec![1], 1), case(2, vec![2], 2)],
        )]);
        let submission = Submission {
            source: "int main(void) { not C at all }".to_string(),
            language: Language::Compiled,
        };

        let verdict = validate(&store, 1, &submission).await.unwrap();
        assert!(!verdict.passed);
        assert!(verdict.cases.is_empty());
        assert!(verdict.error_message.as_deref().unwrap().contains("error"));
    }

    #[tokio::test]
    async fn unencodable_input_skips_the_case() {
        let mut input = BTreeMap::new();
        input.insert(
            "words".to_string(),
            InputValue::List(vec![Scalar::Text("a,b".into())]),
        );
        let tc = TestCase {
            id: Some(1),
            input,
            output: InputValue::Scalar(Scalar::Int(0)),
        };
        let store = JsonProblemStore::from_problems(vec![problem(1, vec![tc])]);

        let verdict = validate(&store, 1, &scripted(SUM_PY)).await.unwrap();
        assert!(!verdict.passed);
        assert_eq!(verdict.cases[0].status, CaseStatus::Skipped);
        assert!(verdict.cases[0]
            .message
            .as_deref()
            .unwrap()
            .contains("delimiter"));
    }

    #[test]
    fn output_comparison_ignores_trailing_whitespace() {
        assert!(compare_output("6\n", "6"));
        assert!(compare_output("a b  \nc\n\n", "a b\nc"));
        assert!(!compare_output("6", "7"));
        assert!(!compare_output("a\nb", "a b"));
    }
}
