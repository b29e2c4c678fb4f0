// Prompts for CV enhancement and CV text structuring.

pub const ENHANCE_PROMPT: &str = r#"Enhance this CV content to be more professional and impactful.

CV Data:
- Name: {name}
- Summary: {summary}
- Experience: {experiences}
- Skills: {skills}

Provide improved versions of:
1. Professional summary
2. Experience descriptions (make them achievement-focused with quantifiable results)

Return ONLY valid JSON with this structure:
{"summary": "enhanced summary here", "experiences": [{"id": "...", "description": "enhanced description"}]}"#;

pub const STRUCTURE_PROMPT: &str = r#"Extract the CV below into structured JSON. Use empty strings or empty arrays for anything missing. Do not invent details.

Return ONLY valid JSON with this structure:
{
  "personalInfo": {"fullName": "", "email": "", "phone": "", "location": "", "linkedin": "", "website": ""},
  "summary": "",
  "experiences": [{"title": "", "company": "", "location": "", "startDate": "", "endDate": "", "current": false, "description": ""}],
  "education": [{"degree": "", "institution": "", "startDate": "", "endDate": ""}],
  "skills": [""]
}

CV TEXT:
{text}"#;
