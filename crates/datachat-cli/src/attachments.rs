//! Reading uploads from disk and writing generated plots back to it.

use std::path::{Path, PathBuf};

use datachat_core::{Attachment, ChatError, ChatMessage, ErrorKind, SessionId};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

/// Read an image for upload. The mime type comes from the file extension.
pub fn load_image(path: &Path) -> Result<Attachment, ChatError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if !IMAGE_EXTENSIONS.contains(&extension.as_str()) {
        return Err(ChatError::UnsupportedAttachment(format!(
            "{} (supported: {})",
            path.display(),
            IMAGE_EXTENSIONS.join(", ")
        )));
    }

    let mime = mime_guess::from_path(path).first_or_octet_stream();
    let data = std::fs::read(path)?;
    if data.is_empty() {
        return Err(ChatError::UnsupportedAttachment(format!(
            "{} is empty",
            path.display()
        )));
    }

    tracing::info!("Image attached: {} ({} bytes, {mime})", path.display(), data.len());
    Ok(Attachment::new(mime.essence_str(), data))
}

/// The image to keep pending after a failed turn. A turn rejected before
/// sending leaves its image attached for the next attempt.
pub fn image_after_failure(image: Option<Attachment>, err: &ChatError) -> Option<Attachment> {
    match err.kind() {
        ErrorKind::Validation => image,
        _ => None,
    }
}

/// Number of plots already stored in `messages`.
pub fn plot_count(messages: &[ChatMessage]) -> usize {
    messages.iter().map(|m| m.plots.len()).sum()
}

/// Write `plots` as `<dir>/<session>_<n>.<ext>`, numbering from `first + 1`.
pub fn save_plots(
    dir: &Path,
    session: &SessionId,
    first: usize,
    plots: &[Attachment],
) -> std::io::Result<Vec<PathBuf>> {
    if plots.is_empty() {
        return Ok(Vec::new());
    }
    std::fs::create_dir_all(dir)?;

    let mut written = Vec::with_capacity(plots.len());
    for (i, plot) in plots.iter().enumerate() {
        let path = dir.join(format!("{session}_{}.{}", first + i + 1, plot.extension()));
        std::fs::write(&path, &plot.data)?;
        written.push(path);
    }
    tracing::info!("Saved {} plot(s) to {}", written.len(), dir.display());
    Ok(written)
}
