// Prompts for personalised coding challenge generation.

pub const CHALLENGE_SYSTEM: &str = "You are an expert technical interviewer. \
    Generate ONLY valid JSON. No explanations, no markdown, just pure JSON.";

pub const CHALLENGE_PROMPT: &str = r#"Generate {count} coding challenges in this EXACT JSON format:

{
  "challenges": [
    {
      "title": "string",
      "difficulty": "Easy" | "Medium" | "Hard",
      "description": "string",
      "constraints": ["string"],
      "examples": [{"input": "string", "output": "string", "explanation": "string"}],
      "testCases": [{"id": "string", "input": "string", "expectedOutput": "string"}],
      "timeLimit": number,
      "memoryLimit": number,
      "category": "string",
      "tags": ["string"],
      "hints": ["string"],
      "starterCode": {
        "javascript": "string",
        "python": "string",
        "java": "string",
        "cpp": "string",
        "typescript": "string",
        "go": "string"
      }
    }
  ]
}

Requirements:
- Personalized to skills: {cv_skills}
- Relevant to job: {job_skills}
- Matching skills: {matching_skills}
- Difficulty: {difficulty}
- Generate exactly {count} challenges
- Each challenge must have 2 examples and 5 test cases
- timeLimit: 100-2000 milliseconds
- memoryLimit: 64-512 MB

CV: {experience}
Job: {job}

Return ONLY the JSON object. Start with { and end with }. No other text."#;
