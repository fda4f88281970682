// Cross-cutting prompt fragments shared by every backend.

/// Appended as a final user turn when a backend has no native JSON mode.
pub const JSON_ONLY_INSTRUCTION: &str =
    "Respond with valid JSON only. No additional text, explanations, or markdown code fences.";
