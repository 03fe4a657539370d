use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;

use crate::llm::wire::{Blob, GenerateContentResponse, PartKind, ResponsePart};
use crate::models::Attachment;

/// Images embedded in the first candidate of `response`, in order of appearance.
pub fn extract_plots(response: &GenerateContentResponse) -> Vec<Attachment> {
    let plots = plots_from_parts(response.parts());
    if plots.is_empty() {
        tracing::debug!("No plots found in response");
    } else {
        tracing::info!("Extracted {} plot(s) from response", plots.len());
    }
    plots
}

/// Decoded `image/*` inline payloads among `parts`. Empty or undecodable
/// payloads are skipped.
pub fn plots_from_parts(parts: &[ResponsePart]) -> Vec<Attachment> {
    parts
        .iter()
        .filter_map(|part| match part.kind() {
            PartKind::InlineData(blob) => decode_image(blob),
            _ => None,
        })
        .collect()
}

/// Whether the model wrote code to answer.
pub fn has_executable_code(response: &GenerateContentResponse) -> bool {
    response
        .parts()
        .iter()
        .any(|p| matches!(p.kind(), PartKind::ExecutableCode(_)))
}

fn decode_image(blob: &Blob) -> Option<Attachment> {
    if !blob.mime_type.starts_with("image/") {
        return None;
    }
    match BASE64_STANDARD.decode(blob.data.as_bytes()) {
        Ok(bytes) if !bytes.is_empty() => Some(Attachment::new(blob.mime_type.clone(), bytes)),
        Ok(_) => {
            tracing::warn!("Invalid plot data: empty {} payload", blob.mime_type);
            None
        }
        Err(e) => {
            tracing::warn!("Invalid plot data ({}): {e}", blob.mime_type);
            None
        }
    }
}
