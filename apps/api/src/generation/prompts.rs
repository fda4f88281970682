// Prompt constants and context formatters for the Generation module.
// Templates use `{placeholder}` markers filled with `str::replace` before sending.

use crate::models::profile::CandidateProfile;
use crate::models::resume::BaseResume;
use crate::models::vacancy::VacancyRecord;

pub const MATCH_SYSTEM: &str = "You are an experienced technical recruiter. \
    You assess how well a candidate fits a vacancy and answer with JSON only.";

/// Replace `{profile}` and `{vacancy}` before sending.
pub const MATCH_PROMPT_TEMPLATE: &str = r#"Assess how well the candidate fits the vacancy.

CANDIDATE:
{profile}

VACANCY:
{vacancy}

Return a JSON object with this EXACT schema:
{
  "match_score": 72,
  "reasons": ["Five years of Rust matches the core requirement", "Salary expectations overlap"],
  "matching_skills": ["Rust", "PostgreSQL"],
  "missing_skills": ["Kubernetes"],
  "required_skills": ["Rust", "PostgreSQL", "Kubernetes"],
  "recommendation": "Apply; highlight the distributed systems work."
}

Rules:
- match_score is an integer from 0 (no fit) to 100 (perfect fit)
- reasons: at most 5, most important first
- required_skills: the key skills the vacancy asks for, as short canonical names"#;

pub const RESUME_SYSTEM: &str = "You are a professional resume writer. \
    You only use facts present in the candidate data and answer with JSON only.";

/// Replace `{profile}` before sending.
pub const RESUME_GENERATION_PROMPT_TEMPLATE: &str = r#"Write a complete resume for this candidate.

CANDIDATE:
{profile}

Return a JSON object:
{
  "title": "Senior Backend Engineer",
  "summary": "...",
  "skills": ["Rust", "PostgreSQL"],
  "experience": [
    {"company": "...", "position": "...", "start": "2021-03", "end": null, "highlights": ["..."]}
  ],
  "education": [{"institution": "...", "degree": "...", "year": 2018}],
  "languages": [{"name": "English", "level": "B2"}]
}

Do NOT invent employers, dates, or numbers that are not in the candidate data."#;

/// Replace `{base_resume}`, `{vacancy}` and `{profile}` before sending.
pub const RESUME_ADAPTATION_PROMPT_TEMPLATE: &str = r#"Adapt the base resume to the vacancy below.

BASE RESUME:
{base_resume}

VACANCY:
{vacancy}

CANDIDATE DATA (source of truth):
{profile}

Return a JSON object:
{
  "adapted_resume": { ...same structure as the base resume... },
  "adaptations": ["Moved Kafka experience to the top of highlights", "Retitled to match the vacancy"]
}

Rules:
1. Reorder and rephrase; never add skills or experience the candidate does not have
2. Use the vacancy's terminology where the candidate's experience supports it
3. Each adaptation is one short sentence describing one change"#;

pub const COVER_LETTER_SYSTEM: &str = "You are a career consultant writing concise, \
    specific cover letters. Plain text only, no placeholders.";

/// Replace `{profile}` and `{vacancy}` before sending.
pub const COVER_LETTER_PROMPT_TEMPLATE: &str = r#"Write a cover letter for this application.

CANDIDATE:
{profile}

VACANCY:
{vacancy}

Keep it under 200 words, address the company by name, and connect two or three of
the candidate's strongest relevant skills to the vacancy's requirements."#;

fn or_unknown(value: Option<&str>) -> &str {
    value.filter(|v| !v.trim().is_empty()).unwrap_or("not specified")
}

pub fn format_profile(profile: &CandidateProfile) -> String {
    let salary = match (profile.preferred_salary_min, profile.preferred_salary_max) {
        (None, None) => "not specified".to_string(),
        (min, max) => format!(
            "{}-{}",
            min.map(|v| v.to_string()).unwrap_or_else(|| "?".to_string()),
            max.map(|v| v.to_string()).unwrap_or_else(|| "?".to_string())
        ),
    };
    let structured = profile
        .structured_profile
        .as_ref()
        .map(|v| v.to_string())
        .unwrap_or_else(|| "{}".to_string());

    format!(
        "Position: {}\nExperience: {}\nSkills: {}\nSalary: {}\nLocations: {}\nSummary: {}\n\nFull profile: {}",
        or_unknown(profile.preferred_position.as_deref()),
        profile
            .experience_years
            .map(|y| format!("{y} years"))
            .unwrap_or_else(|| "not specified".to_string()),
        profile.skills.join(", "),
        salary,
        profile.preferred_locations.join(", "),
        or_unknown(profile.summary.as_deref()),
        structured,
    )
}

pub fn format_vacancy(vacancy: &VacancyRecord) -> String {
    let salary = vacancy.salary_text();
    format!(
        "Title: {}\nCompany: {}\nSalary: {}\nLocation: {}\nExperience: {}\nEmployment: {}\nRequirements: {}\nDescription: {}\nKey skills: {}",
        vacancy.title,
        vacancy.company_name,
        or_unknown(Some(salary.as_str())),
        or_unknown(vacancy.location.as_deref()),
        or_unknown(vacancy.experience.as_deref()),
        or_unknown(vacancy.employment_type.as_deref()),
        or_unknown(vacancy.requirements.as_deref()),
        or_unknown(vacancy.description.as_deref()),
        vacancy.key_skills.join(", "),
    )
}

pub fn format_base_resume(resume: &BaseResume) -> String {
    format!("Title: {}\n\nContent: {}", resume.title, resume.content)
}
