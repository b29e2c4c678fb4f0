//! Skill extraction for challenge personalisation.

use serde_json::Value;

use crate::models::challenge::StarterCode;

const COMMON_SKILLS: &[&str] = &[
    "JavaScript",
    "TypeScript",
    "Python",
    "Java",
    "C++",
    "Go",
    "Rust",
    "React",
    "Vue",
    "Angular",
    "Node.js",
    "Express",
    "Django",
    "Flask",
    "MongoDB",
    "PostgreSQL",
    "MySQL",
    "Redis",
    "Docker",
    "Kubernetes",
    "AWS",
    "Azure",
    "GCP",
    "Git",
    "CI/CD",
    "REST API",
    "GraphQL",
    "Machine Learning",
    "Data Structures",
    "Algorithms",
    "System Design",
    "Microservices",
    "Testing",
    "Agile",
    "Scrum",
    "TDD",
    "BDD",
];

/// Known skills mentioned anywhere in free text, case-insensitively.
pub fn skills_from_text(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    COMMON_SKILLS
        .iter()
        .filter(|skill| lower.contains(&skill.to_lowercase()))
        .map(|s| s.to_string())
        .collect()
}

/// Skills listed in structured CV data: `skills`, `technicalSkills`, and the
/// `technologies` / `skills` of each experience entry. Order-preserving, no
/// duplicates.
pub fn skills_from_cv(cv: &Value) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut push_all = |v: Option<&Value>| {
        for skill in v.and_then(Value::as_array).into_iter().flatten() {
            if let Some(s) = skill.as_str() {
                if !out.iter().any(|existing| existing == s) {
                    out.push(s.to_string());
                }
            }
        }
    };

    push_all(cv.get("skills"));
    push_all(cv.get("technicalSkills"));
    for exp in cv
        .get("experience")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        push_all(exp.get("technologies"));
        push_all(exp.get("skills"));
    }
    out
}

/// Structured data is read as a CV; a bare string is scanned as text.
pub fn extract_skills(value: &Value) -> Vec<String> {
    match value {
        Value::String(text) => skills_from_text(text),
        Value::Object(_) => skills_from_cv(value),
        _ => Vec::new(),
    }
}

/// CV skills that some job skill mentions.
pub fn matching_skills(cv_skills: &[String], job_skills: &[String]) -> Vec<String> {
    cv_skills
        .iter()
        .filter(|skill| {
            let needle = skill.to_lowercase();
            job_skills.iter().any(|js| js.to_lowercase().contains(&needle))
        })
        .cloned()
        .collect()
}

/// "Title at Company" for each experience entry, or "N/A".
pub fn experience_summary(cv: &Value) -> String {
    let entries: Vec<String> = cv
        .get("experience")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .map(|e| {
            format!(
                "{} at {}",
                e.get("title").and_then(Value::as_str).unwrap_or_default(),
                e.get("company").and_then(Value::as_str).unwrap_or_default()
            )
        })
        .collect();
    if entries.is_empty() {
        "N/A".to_string()
    } else {
        entries.join(", ")
    }
}

pub fn default_starter_code(title: &str) -> StarterCode {
    StarterCode {
        javascript: Some(format!(
            "function solution() {{\n  // {title}\n  // Your solution here\n}}"
        )),
        python: Some(format!(
            "def solution():\n    # {title}\n    # Your solution here\n    pass"
        )),
        java: Some(format!(
            "public class Solution {{\n    // {title}\n    public void solution() {{\n        // Your solution here\n    }}\n}}"
        )),
        cpp: Some(format!(
            "#include <iostream>\nusing namespace std;\n\n// {title}\nvoid solution() {{\n    // Your solution here\n}}"
        )),
        typescript: Some(format!(
            "function solution(): void {{\n  // {title}\n  // Your solution here\n}}"
        )),
        go: Some(format!(
            "package main\n\n// {title}\nfunc solution() {{\n    // Your solution here\n}}"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_skills_from_text() {
        let skills = skills_from_text("Senior engineer with Rust, PostgreSQL and docker experience");
        assert_eq!(skills, vec!["Rust", "PostgreSQL", "Docker"]);
    }

    #[test]
    fn test_skills_from_cv_dedups() {
        let cv = json!({
            "skills": ["Rust", "SQL"],
            "technicalSkills": ["Rust", "Kafka"],
            "experience": [
                { "title": "Engineer", "company": "Acme", "technologies": ["Kafka", "gRPC"] },
                { "title": "Intern", "company": "Initech" }
            ]
        });
        assert_eq!(skills_from_cv(&cv), vec!["Rust", "SQL", "Kafka", "gRPC"]);
        assert_eq!(experience_summary(&cv), "Engineer at Acme, Intern at Initech");
    }

    #[test]
    fn test_extract_dispatches_on_shape() {
        assert_eq!(extract_skills(&json!("Go and GraphQL")), vec!["Go", "GraphQL"]);
        assert!(extract_skills(&json!(42)).is_empty());
        assert_eq!(experience_summary(&json!({})), "N/A");
    }

    #[test]
    fn test_matching_skills() {
        let cv = vec!["Rust".to_string(), "Java".to_string(), "Figma".to_string()];
        let job = vec!["Rust".to_string(), "JavaScript".to_string()];
        assert_eq!(matching_skills(&cv, &job), vec!["Rust", "Java"]);
    }

    #[test]
    fn test_default_starter_code_mentions_title() {
        let code = default_starter_code("Two Sum");
        assert!(code.python.unwrap().contains("# Two Sum"));
        assert!(code.go.unwrap().starts_with("package main"));
    }
}
