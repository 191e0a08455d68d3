use super::model::{BugRule, Severity};
use regex::Regex;
use std::sync::LazyLock;

static BUILTIN_RULES: LazyLock<Vec<BugRule>> = LazyLock::new(|| {
    vec![
        BugRule {
            category: "sql-injection",
            label: "Security",
            severity: Severity::Major,
            description: "Potential SQL injection vulnerability detected",
            remediation: "Use parameterized queries or prepared statements",
            patterns: compile(&[
                r#"(?i)query\s*\+\s*['"]"#,
                r#"(?i)execute\s*\(\s*['"]"#,
                r"(?i)SELECT.*FROM.*WHERE.*=.*\+",
                r"(?i)\$_GET\[.*\].*query",
                r"(?i)\$_POST\[.*\].*query",
            ]),
        },
        BugRule {
            category: "xss-vulnerability",
            label: "Security",
            severity: Severity::Critical,
            description: "Cross-site scripting (XSS) vulnerability found",
            remediation: "Sanitize user input and use safe DOM methods",
            patterns: compile(&[
                r"(?i)innerHTML\s*=\s*.*\+",
                r"(?i)document\.write\s*\(",
                r"(?i)eval\s*\(",
                r"(?i)dangerouslySetInnerHTML",
            ]),
        },
        BugRule {
            category: "buffer-overflow",
            label: "Security",
            severity: Severity::Critical,
            description: "Buffer overflow vulnerability detected",
            remediation: "Use safe string functions or bounds checking",
            patterns: compile(&[
                r"(?i)strcpy\s*\(",
                r"(?i)strcat\s*\(",
                r"(?i)sprintf\s*\(",
                r"(?i)gets\s*\(",
            ]),
        },
        BugRule {
            category: "memory-leak",
            label: "Memory Management",
            severity: Severity::Minor,
            description: "Potential memory leak detected",
            remediation: "Ensure proper memory deallocation",
            patterns: compile(&[
                r"(?i)malloc\s*\(.*\)",
                r"(?i)new\s+\w+",
                r"(?i)calloc\s*\(.*\)",
            ]),
        },
        BugRule {
            category: "null-pointer",
            label: "Runtime Error",
            severity: Severity::Major,
            description: "Null pointer dereference risk",
            remediation: "Add null checks before dereferencing",
            patterns: compile(&[r"(?i)\*\w+", r"(?i)\w+\.\w+", r"(?i)\[\w+\]"]),
        },
        BugRule {
            category: "hardcoded-secrets",
            label: "Security",
            severity: Severity::Critical,
            description: "Hardcoded credentials or secrets found",
            remediation: "Use environment variables or secure config",
            patterns: compile(&[
                r#"(?i)password\s*=\s*['"]\w+['"]"#,
                r#"(?i)api_key\s*=\s*['"]\w+['"]"#,
                r#"(?i)secret\s*=\s*['"]\w+['"]"#,
                r#"(?i)token\s*=\s*['"]\w+['"]"#,
            ]),
        },
        BugRule {
            category: "insecure-random",
            label: "Security",
            severity: Severity::Minor,
            description: "Insecure random number generation",
            remediation: "Use cryptographically secure random generators",
            patterns: compile(&[
                r"(?i)Math\.random\(\)",
                r"(?i)rand\(\)",
                r"(?i)Random\(\)",
            ]),
        },
        BugRule {
            category: "race-condition",
            label: "Concurrency",
            severity: Severity::Minor,
            description: "Potential race condition detected",
            remediation: "Use proper synchronization mechanisms",
            patterns: compile(&[
                r"(?i)pthread_create",
                r"(?i)thread.*start",
                r"(?i)async",
            ]),
        },
    ]
});

/// The builtin rule table, in a fixed order. Compiled once on first use.
pub fn builtin_rules() -> &'static [BugRule] {
    &BUILTIN_RULES
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().map(|p| Regex::new(p).unwrap()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_compiles_and_keeps_order() {
        let rules = builtin_rules();
        assert_eq!(rules.len(), 8);
        assert_eq!(rules[0].category, "sql-injection");
        assert_eq!(rules[7].category, "race-condition");
        assert!(rules.iter().all(|r| !r.patterns.is_empty()));
    }

    #[test]
    fn xss_rule_matches_eval() {
        let rules = builtin_rules();
        let xss = rules
            .iter()
            .find(|r| r.category == "xss-vulnerability")
            .unwrap();
        assert_eq!(xss.severity, Severity::Critical);
        assert!(xss.patterns.iter().any(|p| p.is_match("eval(userInput)")));
    }

    #[test]
    fn secrets_rule_matches_assignment() {
        let rules = builtin_rules();
        let secrets = rules
            .iter()
            .find(|r| r.category == "hardcoded-secrets")
            .unwrap();
        assert!(secrets
            .patterns
            .iter()
            .any(|p| p.is_match(r#"password = "hunter2""#)));
    }
}
