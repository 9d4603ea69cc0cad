// Model response extraction
//
// Raw model output is either a convergence sentinel or a CSS payload,
// usually fenced, sometimes not. Extraction is total over arbitrary input:
// it returns a verdict or a MalformedResponse error, never panics.

use crate::errors::ServiceError;

/// Canonical convergence sentinel. The prompts instruct the model to reply
/// with exactly this token when no revision is needed; a couple of common
/// paraphrases are accepted defensively.
pub const UNCHANGED_SENTINEL: &str = "UNCHANGED";

/// Outcome of one evaluation (or generation) response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Unchanged,
    Revised(String),
}

/// Parse raw model output into a verdict.
///
/// Order matters: sentinel first, then the first fenced code block, then a
/// brace-bearing fallback for models that ignore the fencing instruction.
pub fn extract(raw: &str) -> Result<Verdict, ServiceError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::MalformedResponse(
            "empty response".to_string(),
        ));
    }

    if is_unchanged(trimmed) {
        return Ok(Verdict::Unchanged);
    }

    if let Some(block) = first_fenced_block(trimmed) {
        let css = block.trim();
        if css.is_empty() {
            return Err(ServiceError::MalformedResponse(
                "fenced block contains no css".to_string(),
            ));
        }
        return Ok(Verdict::Revised(css.to_string()));
    }

    // Some models drop the fence entirely and answer with bare rules.
    if trimmed.contains('{') && trimmed.contains('}') {
        return Ok(Verdict::Revised(trimmed.to_string()));
    }

    Err(ServiceError::MalformedResponse(format!(
        "no sentinel, fence, or css rules in response ({} chars)",
        raw.len()
    )))
}

/// The prose around the first fenced block, used as feedback context for
/// the next generation round. Empty when the response was fence-only.
pub fn feedback_text(raw: &str) -> Option<String> {
    let mut prose = String::new();
    let mut in_fence = false;
    for line in raw.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if !in_fence {
            prose.push_str(line);
            prose.push('\n');
        }
    }
    let prose = prose.trim().to_string();
    if prose.is_empty() {
        None
    } else {
        Some(prose)
    }
}

/// Optional quality score the evaluator may report on a `SCORE:` line,
/// clamped to 0.0..=1.0.
pub fn parse_score(raw: &str) -> Option<f32> {
    for line in raw.lines() {
        let trimmed = line.trim();
        let Some(rest) = trimmed
            .strip_prefix("SCORE:")
            .or_else(|| trimmed.strip_prefix("Score:"))
        else {
            continue;
        };
        return rest.trim().parse::<f32>().ok().map(|s| s.clamp(0.0, 1.0));
    }
    None
}

fn is_unchanged(text: &str) -> bool {
    let bare = text.trim().trim_end_matches('.').trim();
    if bare.eq_ignore_ascii_case(UNCHANGED_SENTINEL) {
        return true;
    }
    // Paraphrases only count when the response carries no payload.
    if text.contains("```") {
        return false;
    }
    let lower = text.to_lowercase();
    lower.contains("no changes needed") || lower.contains("no further changes")
}

/// First fenced code block, any info string. An unterminated fence yields
/// everything after the opening line.
fn first_fenced_block(text: &str) -> Option<String> {
    let mut in_block = false;
    let mut content = String::new();
    for raw_line in text.lines() {
        let line = raw_line.trim_end_matches('\r');
        if line.trim_start().starts_with("```") {
            if in_block {
                if content.ends_with('\n') {
                    content.pop();
                }
                return Some(content);
            }
            in_block = true;
            continue;
        }
        if in_block {
            content.push_str(line);
            content.push('\n');
        }
    }
    if in_block {
        if content.ends_with('\n') {
            content.pop();
        }
        return Some(content);
    }
    None
}
