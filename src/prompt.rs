// Prompt assembly for generation and evaluation calls
//
// Both prompts pin the output contract the extractor expects: exactly one
// fenced css block, or the bare UNCHANGED sentinel. Keeping the contract in
// the system prompt (rather than the user turn) survives providers that
// reorder or truncate user content.

use crate::gateway::RequestPart;
use crate::host::Capture;
use crate::snapshot::ElementNode;

pub const GENERATION_SYSTEM_PROMPT: &str = "\
You are a CSS stylist for a live document.

You receive an outline of the document's elements, the stylesheet currently \
applied, and a styling request. Respond with a complete replacement \
stylesheet that fulfills the request.

Rules:
1. Target only the addressable classes listed in the outline. Classes \
marked [aux: ...] belong to scripts and must not be restyled.
2. Return ONLY one fenced css code block. No prose before or after it.
3. If the current stylesheet already fulfills the request, reply with \
exactly UNCHANGED instead of a code block.";

pub const EVALUATION_SYSTEM_PROMPT: &str = "\
You are judging whether an applied stylesheet fulfills a styling request.

You receive the request, the css that was applied, and (when available) a \
screenshot of the resulting render.

Respond in one of two ways:
1. If the result fulfills the request, reply with exactly UNCHANGED.
2. Otherwise, briefly state what is wrong, then provide the corrected \
complete stylesheet in one fenced css code block. Optionally lead with a \
line `SCORE: <0..1>` rating how close the current result is.";

/// Assemble the user parts for one generation call.
pub fn generation_parts(
    intent: &str,
    snapshot: &ElementNode,
    current_css: &str,
    feedback: Option<&str>,
    reference_images: &[RequestPart],
) -> Vec<RequestPart> {
    let mut text = String::new();
    text.push_str("Styling request:\n");
    text.push_str(intent);
    text.push_str("\n\nDocument outline:\n");
    text.push_str(&snapshot.outline());

    if current_css.trim().is_empty() {
        text.push_str("\nNo stylesheet is currently applied.\n");
    } else {
        text.push_str("\nCurrently applied stylesheet:\n```css\n");
        text.push_str(current_css);
        text.push_str("\n```\n");
    }

    if let Some(feedback) = feedback {
        text.push_str("\nReviewer feedback on the previous round:\n");
        text.push_str(feedback);
        text.push('\n');
    }

    if !reference_images.is_empty() {
        text.push_str("\nReference imagery for the desired look is attached.\n");
    }

    let mut parts = vec![RequestPart::Text(text)];
    parts.extend(reference_images.iter().cloned());
    parts
}

/// Assemble the user parts for one evaluation call.
pub fn evaluation_parts(
    intent: &str,
    applied_css: &str,
    capture: Option<&Capture>,
) -> Vec<RequestPart> {
    let mut text = String::new();
    text.push_str("Styling request:\n");
    text.push_str(intent);
    text.push_str("\n\nApplied stylesheet:\n```css\n");
    text.push_str(applied_css);
    text.push_str("\n```\n");

    match capture {
        Some(_) => text.push_str("\nA screenshot of the resulting render is attached.\n"),
        None => text.push_str(
            "\nNo screenshot is available; judge from the stylesheet alone.\n",
        ),
    }

    let mut parts = vec![RequestPart::Text(text)];
    if let Some(capture) = capture {
        parts.push(RequestPart::image(
            capture.media_type.clone(),
            capture.data.clone(),
        ));
    }
    parts
}
