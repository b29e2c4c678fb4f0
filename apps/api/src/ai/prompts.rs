// Prompts for mock-interview question generation and answer evaluation.

pub const TECHNICAL_QUESTION_PROMPT: &str = r#"Generate 1 technical interview question based on:

JOB: {job}

CANDIDATE SKILLS: {skills}

Return ONLY valid JSON (no markdown):
{"id": {id}, "type": "technical", "question": "...", "idealAnswer": "brief 1-2 sentence answer", "evaluationCriteria": ["criterion 1", "criterion 2", "criterion 3"]}"#;

pub const BEHAVIORAL_QUESTION_PROMPT: &str = r#"Generate 1 behavioral interview question (STAR format) based on:

JOB: {job}

CANDIDATE EXPERIENCE: {skills}

Return ONLY valid JSON (no markdown):
{"id": {id}, "type": "behavioral", "question": "Tell me about a time when...", "idealAnswer": "brief 1-2 sentence STAR answer", "evaluationCriteria": ["criterion 1", "criterion 2", "criterion 3"]}"#;

pub const EVALUATION_PROMPT: &str = r#"You are a STRICT interview evaluator. Compare the candidate's answer against the ideal answer and give HONEST scores.

QUESTION: {question}

IDEAL ANSWER: {ideal}

CANDIDATE'S ANSWER: {answer}

EVALUATION CRITERIA: {criteria}

STRICT SCORING RULES:
- Score 0-2: Wrong answer, irrelevant, or minimal effort (e.g., just "yes", "no", single words)
- Score 3-4: Partially correct but missing major points or lacks detail
- Score 5-6: Covers basic concepts but incomplete or has some errors
- Score 7-8: Good answer covering most key points from ideal answer
- Score 9-10: Excellent answer matching or exceeding ideal answer

CRITICAL INSTRUCTIONS:
1. If candidate gives SHORT answers (1-5 words) when ideal answer is LONG (paragraph), score 0-2
2. If candidate's answer is COMPLETELY DIFFERENT from ideal answer, score 0-1
3. If candidate just says "yes", "no", "maybe", "I don't know", score 0
4. Compare candidate's technical accuracy against ideal answer; wrong facts mean a low score
5. Check if candidate covers the KEY CONCEPTS mentioned in ideal answer
6. Be HARSH on vague or generic answers that don't match the ideal answer

Return ONLY this JSON (NO markdown, NO code blocks):
{
  "score": <0-10>,
  "strengths": ["strength1 if any", "strength2 if any"],
  "weaknesses": ["specific weakness1", "specific weakness2"],
  "suggestions": ["how to improve1", "how to improve2"],
  "feedback": "Honest direct feedback comparing to ideal answer",
  "keyPointsCovered": ["concepts they got right"],
  "keyPointsMissed": ["concepts from ideal answer they missed"]
}

Be STRICT and HONEST. If the answer is bad, give score 0-3. Don't be generous!"#;

pub const DEFAULT_CRITERIA: &str = "Accuracy, completeness, clarity";
