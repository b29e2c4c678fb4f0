//! Code execution against test cases through Judge0 or Piston.
//!
//! Backends sit behind the `CodeRunner` trait. Judge0 is preferred when an
//! API key is configured, Piston when only its URL is; with neither the
//! feature is reported as not configured.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::CodeExecutionConfig;
use crate::models::challenge::TestCase;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{backend} API error (status {status}): {message}")]
    Api {
        backend: &'static str,
        status: u16,
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    JavaScript,
    Python,
    Java,
    Cpp,
    TypeScript,
    Go,
}

impl Language {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "javascript" | "js" => Some(Self::JavaScript),
            "python" | "py" => Some(Self::Python),
            "java" => Some(Self::Java),
            "cpp" | "c++" => Some(Self::Cpp),
            "typescript" | "ts" => Some(Self::TypeScript),
            "go" | "golang" => Some(Self::Go),
            _ => None,
        }
    }

    pub fn judge0_id(self) -> u32 {
        match self {
            Self::JavaScript => 63,
            Self::Python => 71,
            Self::Java => 62,
            Self::Cpp => 54,
            Self::TypeScript => 74,
            Self::Go => 60,
        }
    }

    pub fn piston_name(self) -> &'static str {
        match self {
            Self::JavaScript => "javascript",
            Self::Python => "python",
            Self::Java => "java",
            Self::Cpp => "c++",
            Self::TypeScript => "typescript",
            Self::Go => "go",
        }
    }

    fn file_extension(self) -> &'static str {
        match self {
            Self::JavaScript => "js",
            Self::Python => "py",
            Self::Java => "java",
            Self::Cpp => "cpp",
            Self::TypeScript => "ts",
            Self::Go => "go",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Limits {
    /// CPU seconds.
    pub time_limit: f64,
    /// Kilobytes.
    pub memory_limit: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            time_limit: 5.0,
            memory_limit: 256_000,
        }
    }
}

/// What one run of the program produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub output: String,
    pub passed: bool,
    pub execution_time_ms: f64,
    pub memory_kb: f64,
    pub error: Option<String>,
    pub status: String,
}

#[async_trait]
pub trait CodeRunner: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(
        &self,
        code: &str,
        language: Language,
        input: &str,
        expected_output: &str,
        limits: Limits,
    ) -> Result<RunOutcome, RunnerError>;
}

pub fn runner_from_config(config: &CodeExecutionConfig) -> anyhow::Result<Option<Arc<dyn CodeRunner>>> {
    let client = Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()?;
    if let Some(api_key) = &config.judge0_api_key {
        return Ok(Some(Arc::new(Judge0Runner {
            client,
            base_url: config.judge0_url.trim_end_matches('/').to_string(),
            api_key: api_key.clone(),
            use_rapid_api: config.use_rapid_api,
        })));
    }
    if let Some(url) = &config.piston_url {
        return Ok(Some(Arc::new(PistonRunner {
            client,
            base_url: url.trim_end_matches('/').to_string(),
        })));
    }
    Ok(None)
}

pub struct Judge0Runner {
    client: Client,
    base_url: String,
    api_key: String,
    use_rapid_api: bool,
}

#[derive(Serialize)]
struct Judge0Submission<'a> {
    source_code: &'a str,
    language_id: u32,
    stdin: &'a str,
    expected_output: &'a str,
    cpu_time_limit: f64,
    memory_limit: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct Judge0Status {
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Judge0Result {
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub compile_output: Option<String>,
    pub status: Option<Judge0Status>,
    /// Seconds, as a decimal string.
    pub time: Option<String>,
    /// Kilobytes.
    pub memory: Option<f64>,
}

/// Judge0 passes only with status "Accepted" and matching trimmed output.
pub fn judge0_outcome(result: Judge0Result, expected_output: &str) -> RunOutcome {
    let output = result.stdout.unwrap_or_default().trim().to_string();
    let status = result
        .status
        .and_then(|s| s.description)
        .unwrap_or_else(|| "unknown".to_string());
    let error = result
        .stderr
        .filter(|e| !e.is_empty())
        .or(result.compile_output.filter(|e| !e.is_empty()));
    RunOutcome {
        passed: status == "Accepted" && output == expected_output.trim(),
        output,
        execution_time_ms: result
            .time
            .and_then(|t| t.parse::<f64>().ok())
            .unwrap_or(0.0)
            * 1000.0,
        memory_kb: result.memory.unwrap_or(0.0),
        error,
        status,
    }
}

fn host_of(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| "judge0-ce.p.rapidapi.com".to_string())
}

#[async_trait]
impl CodeRunner for Judge0Runner {
    fn name(&self) -> &'static str {
        "judge0"
    }

    async fn run(
        &self,
        code: &str,
        language: Language,
        input: &str,
        expected_output: &str,
        limits: Limits,
    ) -> Result<RunOutcome, RunnerError> {
        let mut request = self
            .client
            .post(format!(
                "{}/submissions?base64_encoded=false&wait=true",
                self.base_url
            ))
            .json(&Judge0Submission {
                source_code: code,
                language_id: language.judge0_id(),
                stdin: input,
                expected_output,
                cpu_time_limit: limits.time_limit,
                memory_limit: limits.memory_limit,
            });
        request = if self.use_rapid_api {
            request
                .header("X-RapidAPI-Key", &self.api_key)
                .header("X-RapidAPI-Host", host_of(&self.base_url))
        } else {
            request.header("X-Auth-Token", &self.api_key)
        };

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RunnerError::Api {
                backend: "Judge0",
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        let result: Judge0Result = response.json().await?;
        Ok(judge0_outcome(result, expected_output))
    }
}

pub struct PistonRunner {
    client: Client,
    base_url: String,
}

#[derive(Serialize)]
struct PistonFile<'a> {
    name: String,
    content: &'a str,
}

#[derive(Serialize)]
struct PistonRequest<'a> {
    language: &'static str,
    version: &'static str,
    files: Vec<PistonFile<'a>>,
    stdin: &'a str,
}

#[derive(Debug, Default, Deserialize)]
pub struct PistonStage {
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub code: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PistonResult {
    pub run: Option<PistonStage>,
    pub compile: Option<PistonStage>,
}

/// Piston reports neither time nor memory; both are 0.
pub fn piston_outcome(result: PistonResult, expected_output: &str) -> RunOutcome {
    let run = result.run.unwrap_or_default();
    let output = run.stdout.unwrap_or_default().trim().to_string();
    let error = run
        .stderr
        .filter(|e| !e.is_empty())
        .or(result.compile.and_then(|c| c.stderr).filter(|e| !e.is_empty()));
    let succeeded = run.code == Some(0);
    RunOutcome {
        passed: output == expected_output.trim(),
        output,
        execution_time_ms: 0.0,
        memory_kb: 0.0,
        error,
        status: if succeeded { "Accepted" } else { "Runtime Error" }.to_string(),
    }
}

#[async_trait]
impl CodeRunner for PistonRunner {
    fn name(&self) -> &'static str {
        "piston"
    }

    async fn run(
        &self,
        code: &str,
        language: Language,
        input: &str,
        expected_output: &str,
        _limits: Limits,
    ) -> Result<RunOutcome, RunnerError> {
        let response = self
            .client
            .post(format!("{}/execute", self.base_url))
            .json(&PistonRequest {
                language: language.piston_name(),
                version: "*",
                files: vec![PistonFile {
                    name: format!("solution.{}", language.file_extension()),
                    content: code,
                }],
                stdin: input,
            })
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RunnerError::Api {
                backend: "Piston",
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        let result: PistonResult = response.json().await?;
        Ok(piston_outcome(result, expected_output))
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub id: String,
    pub input: String,
    pub expected_output: String,
    pub actual_output: String,
    pub passed: bool,
    pub execution_time: f64,
    pub memory_used: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionMetrics {
    pub passed_tests: u32,
    pub total_tests: u32,
    pub success_rate: f64,
    pub avg_execution_time: f64,
    pub avg_memory_used: f64,
}

pub fn metrics(results: &[TestResult]) -> ExecutionMetrics {
    let total = results.len() as u32;
    let passed = results.iter().filter(|r| r.passed).count() as u32;
    let avg = |f: fn(&TestResult) -> f64| {
        if total == 0 {
            0.0
        } else {
            results.iter().map(f).sum::<f64>() / total as f64
        }
    };
    ExecutionMetrics {
        passed_tests: passed,
        total_tests: total,
        success_rate: if total == 0 {
            0.0
        } else {
            passed as f64 / total as f64 * 100.0
        },
        avg_execution_time: avg(|r| r.execution_time),
        avg_memory_used: avg(|r| r.memory_used),
    }
}

/// Runs every test case in order. A backend failure fails that case only.
pub async fn run_test_cases(
    runner: &dyn CodeRunner,
    code: &str,
    language: Language,
    test_cases: &[TestCase],
    limits: Limits,
) -> Vec<TestResult> {
    let mut results = Vec::with_capacity(test_cases.len());
    for case in test_cases {
        let result = match runner
            .run(code, language, &case.input, &case.expected_output, limits)
            .await
        {
            Ok(outcome) => TestResult {
                id: case.id.clone(),
                input: case.input.clone(),
                expected_output: case.expected_output.clone(),
                actual_output: outcome.output,
                passed: outcome.passed,
                execution_time: outcome.execution_time_ms,
                memory_used: outcome.memory_kb,
                error: outcome.error,
                status: outcome.status,
            },
            Err(e) => {
                warn!("{} run for test case {} failed: {e}", runner.name(), case.id);
                TestResult {
                    id: case.id.clone(),
                    input: case.input.clone(),
                    expected_output: case.expected_output.clone(),
                    actual_output: String::new(),
                    passed: false,
                    execution_time: 0.0,
                    memory_used: 0.0,
                    error: Some(e.to_string()),
                    status: "error".to_string(),
                }
            }
        };
        debug!("Test case {} passed={}", result.id, result.passed);
        results.push(result);
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Echoes stdin, so a case passes when input equals expected output.
    struct EchoRunner;

    #[async_trait]
    impl CodeRunner for EchoRunner {
        fn name(&self) -> &'static str {
            "echo"
        }

        async fn run(
            &self,
            _code: &str,
            _language: Language,
            input: &str,
            expected_output: &str,
            _limits: Limits,
        ) -> Result<RunOutcome, RunnerError> {
            if input == "boom" {
                return Err(RunnerError::Api {
                    backend: "echo",
                    status: 500,
                    message: "sandbox crashed".into(),
                });
            }
            Ok(RunOutcome {
                output: input.to_string(),
                passed: input.trim() == expected_output.trim(),
                execution_time_ms: 10.0,
                memory_kb: 2048.0,
                error: None,
                status: "Accepted".into(),
            })
        }
    }

    fn case(id: &str, input: &str, expected: &str) -> TestCase {
        TestCase {
            id: id.into(),
            input: input.into(),
            expected_output: expected.into(),
        }
    }

    #[test]
    fn test_language_ids() {
        assert_eq!(Language::parse("JavaScript").map(Language::judge0_id), Some(63));
        assert_eq!(Language::parse("py").map(Language::judge0_id), Some(71));
        assert_eq!(Language::parse("go").map(Language::judge0_id), Some(60));
        assert_eq!(Language::parse("c++"), Some(Language::Cpp));
        assert_eq!(Language::parse("cobol"), None);
    }

    #[test]
    fn test_judge0_outcome() {
        let result: Judge0Result = serde_json::from_value(serde_json::json!({
            "stdout": "3\n",
            "stderr": null,
            "compile_output": null,
            "status": { "id": 3, "description": "Accepted" },
            "time": "0.012",
            "memory": 3120
        }))
        .unwrap();
        let outcome = judge0_outcome(result, "3");
        assert!(outcome.passed);
        assert_eq!(outcome.output, "3");
        assert!((outcome.execution_time_ms - 12.0).abs() < 1e-9);
        assert_eq!(outcome.memory_kb, 3120.0);
    }

    #[test]
    fn test_judge0_compile_error_fails() {
        let result: Judge0Result = serde_json::from_value(serde_json::json!({
            "stdout": null,
            "compile_output": "main.cpp:1: error",
            "status": { "description": "Compilation Error" }
        }))
        .unwrap();
        let outcome = judge0_outcome(result, "3");
        assert!(!outcome.passed);
        assert_eq!(outcome.error.as_deref(), Some("main.cpp:1: error"));
        assert_eq!(outcome.status, "Compilation Error");
    }

    #[test]
    fn test_piston_outcome() {
        let result: PistonResult = serde_json::from_value(serde_json::json!({
            "run": { "stdout": "hello\n", "stderr": "", "code": 0 }
        }))
        .unwrap();
        let outcome = piston_outcome(result, "hello");
        assert!(outcome.passed);
        assert_eq!(outcome.status, "Accepted");
        assert_eq!(outcome.error, None);
    }

    #[tokio::test]
    async fn test_run_test_cases_and_metrics() {
        let cases = vec![case("1", "2", "2"), case("2", "5", "6"), case("3", "boom", "x")];
        let results =
            run_test_cases(&EchoRunner, "print(input())", Language::Python, &cases, Limits::default())
                .await;
        assert_eq!(results.len(), 3);
        assert!(results[0].passed);
        assert!(!results[1].passed);
        assert_eq!(results[2].status, "error");
        assert!(results[2].error.as_deref().unwrap().contains("sandbox crashed"));

        let m = metrics(&results);
        assert_eq!(m.passed_tests, 1);
        assert_eq!(m.total_tests, 3);
        assert!((m.success_rate - 100.0 / 3.0).abs() < 1e-9);
        assert!((m.avg_execution_time - 20.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_runner_selection() {
        let mut config = CodeExecutionConfig {
            judge0_url: "https://judge0-ce.p.rapidapi.com".into(),
            judge0_api_key: None,
            use_rapid_api: true,
            piston_url: None,
        };
        assert!(runner_from_config(&config).unwrap().is_none());

        config.piston_url = Some("https://emkc.org/api/v2/piston".into());
        assert_eq!(runner_from_config(&config).unwrap().unwrap().name(), "piston");

        config.judge0_api_key = Some("key".into());
        assert_eq!(runner_from_config(&config).unwrap().unwrap().name(), "judge0");
        assert_eq!(host_of(&config.judge0_url), "judge0-ce.p.rapidapi.com");
    }
}
