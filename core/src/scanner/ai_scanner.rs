// AI-assisted scanner
// Sends code chunks to a Hugging Face text-generation model and parses the
// delimited bug reports it answers with. Strictly best-effort: any failure
// degrades to "no AI findings for this chunk".

use super::{Finding, Scanner};
use crate::collector::CandidateFile;
use crate::error::{CoreError, Result};
use crate::rules::Severity;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://api-inference.huggingface.co/models";
pub const DEFAULT_MODEL: &str = "microsoft/codebert-base";

#[derive(Debug, Clone)]
pub struct AiConfig {
    pub api_url: String,
    pub model: String,
    pub api_key: String,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub request_timeout: Duration,
    /// Upper bound, in bytes of source text, for one inference request.
    pub chunk_size: usize,
    /// Pause between chunk requests to stay under free-tier rate limits.
    pub chunk_pause: Duration,
}

impl AiConfig {
    pub fn new(api_key: String) -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key,
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
            request_timeout: Duration::from_secs(30),
            chunk_size: 512,
            chunk_pause: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Generation {
    generated_text: String,
}

pub struct AiScanner {
    config: AiConfig,
    client: reqwest::Client,
}

impl AiScanner {
    pub fn new(config: AiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| CoreError::Ai(e.to_string()))?;
        Ok(Self { config, client })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/{}",
            self.config.api_url.trim_end_matches('/'),
            self.config.model
        )
    }

    /// One inference round-trip, retried with linearly increasing backoff.
    async fn query_model(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "inputs": prompt,
            "parameters": {
                "max_length": 200,
                "temperature": 0.1,
                "do_sample": true
            }
        });

        let mut attempt: u32 = 0;
        loop {
            match self.request_once(&body).await {
                Ok(text) => return Ok(text),
                Err(e) if attempt < self.config.max_retries => {
                    attempt += 1;
                    tracing::debug!("inference attempt {} failed: {}", attempt, e);
                    tokio::time::sleep(self.config.retry_delay * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn request_once(&self, body: &serde_json::Value) -> Result<String> {
        let mut request = self.client.post(self.endpoint()).json(body);
        if !self.config.api_key.is_empty() {
            request = request.bearer_auth(&self.config.api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CoreError::Ai(e.to_string()))?
            .error_for_status()
            .map_err(|e| CoreError::Ai(e.to_string()))?;

        let generations: Vec<Generation> = response
            .json()
            .await
            .map_err(|e| CoreError::Ai(e.to_string()))?;

        // An empty generation list is a valid "nothing found" answer.
        Ok(generations
            .into_iter()
            .next()
            .map(|g| g.generated_text)
            .unwrap_or_default())
    }
}

#[async_trait]
impl Scanner for AiScanner {
    fn name(&self) -> String {
        "AiScanner".to_string()
    }

    async fn scan_file(&self, file: &CandidateFile, content: &str) -> Vec<Finding> {
        let mut findings = Vec::new();

        for chunk in chunk_by_lines(content, self.config.chunk_size) {
            let prompt = build_prompt(&chunk, &file.extension);
            match self.query_model(&prompt).await {
                Ok(text) => findings.extend(parse_response(&text, file)),
                Err(e) => {
                    tracing::warn!("AI analysis failed for {}: {}", file.relative_path, e);
                }
            }
            tokio::time::sleep(self.config.chunk_pause).await;
        }

        findings
    }
}

/// Splits source into line-aligned chunks of at most `max_len` bytes. A
/// single line longer than the bound becomes its own chunk.
fn chunk_by_lines(content: &str, max_len: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_len = 0;

    for line in content.lines() {
        // Joining costs a newline for every line after the first.
        let added = if current.is_empty() {
            line.len()
        } else {
            line.len() + 1
        };
        if current_len + added > max_len && !current.is_empty() {
            chunks.push(current.join("\n"));
            current = vec![line];
            current_len = line.len();
        } else {
            current.push(line);
            current_len += added;
        }
    }

    if !current.is_empty() {
        chunks.push(current.join("\n"));
    }

    chunks
}

fn build_prompt(code: &str, extension: &str) -> String {
    let language = language_for(extension);
    format!(
        "Analyze this {language} code for bugs and vulnerabilities:\n\n\
         ```{language}\n{code}\n```\n\n\
         Find potential issues including:\n\
         - Security vulnerabilities\n\
         - Memory leaks\n\
         - Null pointer dereferences\n\
         - Race conditions\n\
         - Logic errors\n\n\
         Format: BUG: [type] | SEVERITY: [high/medium/low] | LINE: [number] | MESSAGE: [description]"
    )
}

fn language_for(extension: &str) -> &'static str {
    match extension {
        "js" | "jsx" => "javascript",
        "ts" | "tsx" => "typescript",
        "py" => "python",
        "java" => "java",
        "cpp" => "cpp",
        "c" | "h" => "c",
        "php" => "php",
        "rb" => "ruby",
        "go" => "go",
        "rs" => "rust",
        "cs" => "csharp",
        "swift" => "swift",
        "kt" => "kotlin",
        "scala" => "scala",
        _ => "text",
    }
}

/// Extracts findings from model output. Expected shape, one per line:
/// `BUG: [type] | SEVERITY: [level] | LINE: [number] | MESSAGE: [text]`.
/// Lines that do not fit are discarded.
fn parse_response(text: &str, file: &CandidateFile) -> Vec<Finding> {
    let mut findings = Vec::new();

    for line in text.lines() {
        if !line.contains("BUG:") {
            continue;
        }

        let parts: Vec<&str> = line.split('|').map(str::trim).collect();
        if parts.len() < 4 {
            tracing::debug!("discarding malformed AI report line: {}", line);
            continue;
        }

        let kind = field(parts[0], "BUG:");
        let message = field(parts[3], "MESSAGE:");
        if kind.is_empty() || message.is_empty() {
            tracing::debug!("discarding AI report line with empty fields: {}", line);
            continue;
        }

        let category = kind
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("-");
        let severity = Severity::normalize(field(parts[1], "SEVERITY:"));
        let line_number = field(parts[2], "LINE:")
            .parse::<usize>()
            .ok()
            .filter(|n| *n >= 1)
            .unwrap_or(1);

        findings.push(Finding {
            category,
            severity,
            description: message.to_string(),
            remediation: "Review and fix the identified issue".to_string(),
            file: file.file_name.clone(),
            relative_path: file.relative_path.clone(),
            line: line_number,
            column: None,
            matched_text: None,
        });
    }

    findings
}

/// Returns the trimmed text after `label`, or the whole part when the model
/// skipped the label.
fn field<'a>(part: &'a str, label: &str) -> &'a str {
    match part.split_once(label) {
        Some((_, rest)) => rest.trim(),
        None => part.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn candidate() -> CandidateFile {
        CandidateFile {
            path: PathBuf::from("/tmp/repo/src/app.js"),
            relative_path: "src/app.js".to_string(),
            file_name: "app.js".to_string(),
            extension: "js".to_string(),
            size: 64,
        }
    }

    #[test]
    fn chunks_respect_line_boundaries() {
        let content = "aaaa\nbbbb\ncccc\ndddd";
        let chunks = chunk_by_lines(content, 10);
        assert_eq!(chunks, vec!["aaaa\nbbbb", "cccc\ndddd"]);
    }

    #[test]
    fn joined_chunks_stay_within_the_bound() {
        // Three 4-byte lines with an 8-byte bound: joining any two would
        // cost 9 bytes, so each line must land in its own chunk.
        let chunks = chunk_by_lines("aaaa\nbbbb\ncccc", 8);
        assert_eq!(chunks, vec!["aaaa", "bbbb", "cccc"]);
        assert!(chunks.iter().all(|c| c.len() <= 8));
    }

    #[test]
    fn oversized_line_becomes_its_own_chunk() {
        let long = "x".repeat(40);
        let content = format!("short\n{long}\nshort");
        let chunks = chunk_by_lines(&content, 10);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1], long);
    }

    #[test]
    fn empty_content_produces_single_empty_chunk() {
        assert!(chunk_by_lines("", 512).is_empty());
        assert_eq!(chunk_by_lines("one line", 512), vec!["one line"]);
    }

    #[test]
    fn prompt_names_the_language_and_format() {
        let prompt = build_prompt("eval(x)", "py");
        assert!(prompt.contains("Analyze this python code"));
        assert!(prompt.contains("```python\neval(x)\n```"));
        assert!(prompt.ends_with(
            "Format: BUG: [type] | SEVERITY: [high/medium/low] | LINE: [number] | MESSAGE: [description]"
        ));
    }

    #[test]
    fn unknown_extension_falls_back_to_text() {
        assert_eq!(language_for("zig"), "text");
        assert_eq!(language_for("kt"), "kotlin");
    }

    #[test]
    fn parses_wellformed_report_lines() {
        let text = "Some preamble\n\
                    BUG: SQL Injection | SEVERITY: high | LINE: 12 | MESSAGE: user input reaches query\n\
                    BUG: logic error | SEVERITY: low | LINE: 3 | MESSAGE: off by one";
        let findings = parse_response(text, &candidate());

        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].category, "sql-injection");
        assert_eq!(findings[0].severity, Severity::Major);
        assert_eq!(findings[0].line, 12);
        assert_eq!(findings[0].description, "user input reaches query");
        assert_eq!(findings[0].file, "app.js");
        assert_eq!(findings[0].column, None);
        assert_eq!(findings[1].category, "logic-error");
        assert_eq!(findings[1].severity, Severity::Minor);
    }

    #[test]
    fn discards_lines_missing_parts() {
        let text = "BUG: something | SEVERITY: high\n\
                    no marker here\n\
                    BUG: | SEVERITY: high | LINE: 1 | MESSAGE: empty kind\n\
                    BUG: real | SEVERITY: high | LINE: 1 | MESSAGE: ";
        assert!(parse_response(text, &candidate()).is_empty());
    }

    #[test]
    fn falls_back_to_line_one_on_garbage_line_numbers() {
        let text = "BUG: leak | SEVERITY: medium | LINE: abc | MESSAGE: suspicious\n\
                    BUG: leak2 | SEVERITY: medium | LINE: 0 | MESSAGE: suspicious";
        let findings = parse_response(text, &candidate());
        assert_eq!(findings[0].line, 1);
        assert_eq!(findings[1].line, 1);
    }

    #[test]
    fn unknown_severity_maps_to_unknown() {
        let text = "BUG: weird | SEVERITY: apocalyptic | LINE: 2 | MESSAGE: who knows";
        let findings = parse_response(text, &candidate());
        assert_eq!(findings[0].severity, Severity::Unknown);
    }
}
