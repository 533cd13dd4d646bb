//! Raw HTML artifact for later re-generation.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use log::info;
use sha2::{Digest, Sha256};

use crate::context::DesignContext;
use crate::Result;

/// How persisted artifacts are named
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ArtifactNaming {
    /// SHA-256 of the document; identical captures share a file
    #[default]
    ContentAddressed,
    /// UNIX seconds at write time
    Timestamped,
}

/// Wrap head and body into one document, with the captured CSS appended
/// to the head in a `<style>` block.
pub fn wrap_document(context: &DesignContext) -> String {
    let head = context.head().trim();
    let style = if context.css().trim().is_empty() {
        String::new()
    } else {
        format!("<style>\n{}\n</style>\n", context.css())
    };

    let head = match head.rfind("</head>") {
        Some(pos) => format!("{}{}{}", &head[..pos], style, &head[pos..]),
        None => format!("<head>\n{}{}</head>", head, style),
    };

    format!("<!DOCTYPE html>\n<html>\n{}\n{}\n</html>\n", head, context.body().trim())
}

/// Hex SHA-256 of `document`.
pub fn content_hash(document: &str) -> String {
    hex::encode(Sha256::digest(document.as_bytes()))
}

/// Write the wrapped document for `context` into `dir`.
pub fn persist(context: &DesignContext, dir: impl AsRef<Path>, naming: ArtifactNaming) -> Result<PathBuf> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;

    let document = wrap_document(context);
    let name = match naming {
        ArtifactNaming::ContentAddressed => content_hash(&document),
        ArtifactNaming::Timestamped => {
            let secs = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default();
            format!("{}_capture", secs)
        }
    };

    let path = dir.join(format!("{}.html", name));
    std::fs::write(&path, document)?;
    info!("Saved {} ({})", path.display(), context.source_url());
    Ok(path)
}
