//! File acquisition and client-side type validation.
//!
//! A [`SelectedFile`] is the opaque handle a picker hands to the rest of the
//! client: a local path plus the name and MIME type the upload will declare.
//! Each tool context accepts different files; [`FileKind`] encodes the rule.

use crate::error::ForgeError;
use reqwest::multipart::Part;
use std::path::{Path, PathBuf};
use tracing::debug;

const PDF_MIME: &str = "application/pdf";

/// Image types the image tool accepts, by MIME type and by extension.
const IMAGE_MIMES: &[&str] = &["image/heic", "image/heif", "image/jpeg", "image/png", "image/webp"];
const IMAGE_EXTS: &[&str] = &["heic", "heif", "jpg", "jpeg", "png", "webp"];

/// Which picker a file is being chosen for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// PDF tools: the file must be `application/pdf`.
    Pdf,
    /// Image tools: HEIC/HEIF, JPEG, PNG or WebP.
    Image,
    /// Workflow input: any file; the steps decide what makes sense.
    WorkflowInput,
}

impl FileKind {
    fn rejection(self) -> &'static str {
        match self {
            FileKind::Pdf => "Please select a PDF file.",
            FileKind::Image => "Please select a valid image file (HEIC, JPG, PNG).",
            FileKind::WorkflowInput => "Please select a file.",
        }
    }
}

/// A file chosen by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    pub path: PathBuf,
    /// Name sent as the multipart filename.
    pub name: String,
    /// MIME type guessed from the extension; empty when unknown.
    pub mime: String,
    pub size: u64,
}

impl SelectedFile {
    /// Inspect a local file without reading its contents.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ForgeError> {
        let path = path.as_ref().to_path_buf();
        let meta = std::fs::metadata(&path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ForgeError::FileNotFound { path: path.clone() }
            } else {
                ForgeError::Io {
                    path: path.clone(),
                    source,
                }
            }
        })?;
        if !meta.is_file() {
            return Err(ForgeError::InvalidFile {
                path,
                reason: "Not a regular file.".into(),
            });
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let mime = mime_guess::from_path(&path)
            .first()
            .map(|m| m.essence_str().to_string())
            .unwrap_or_default();
        Ok(Self {
            path,
            name,
            mime,
            size: meta.len(),
        })
    }

    /// Lower-case extension without the dot, `""` when there is none.
    pub fn extension(&self) -> String {
        extension_of(&self.name)
    }

    /// HEIC/HEIF images cannot be decoded locally and need a server preview.
    pub fn is_heic(&self) -> bool {
        matches!(self.extension().as_str(), "heic" | "heif")
            || matches!(self.mime.as_str(), "image/heic" | "image/heif")
    }

    /// Read the file into a multipart part named after the file.
    pub async fn to_part(&self) -> Result<Part, ForgeError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|source| ForgeError::Io {
                path: self.path.clone(),
                source,
            })?;
        debug!("Read {} ({} bytes) for upload", self.name, bytes.len());
        let part = Part::bytes(bytes).file_name(self.name.clone());
        if self.mime.is_empty() {
            return Ok(part);
        }
        part.mime_str(&self.mime)
            .map_err(|e| ForgeError::Internal(format!("mime '{}': {e}", self.mime)))
    }
}

/// Open a file and check it against the picker's rule.
pub fn pick(path: impl AsRef<Path>, kind: FileKind) -> Result<SelectedFile, ForgeError> {
    let file = SelectedFile::open(path)?;
    validate(&file, kind)?;
    Ok(file)
}

/// Check an already opened file against the picker's rule.
pub fn validate(file: &SelectedFile, kind: FileKind) -> Result<(), ForgeError> {
    let ok = match kind {
        FileKind::Pdf => file.mime == PDF_MIME && has_pdf_magic(&file.path),
        FileKind::Image => {
            IMAGE_MIMES.contains(&file.mime.as_str())
                || IMAGE_EXTS.contains(&file.extension().as_str())
        }
        FileKind::WorkflowInput => true,
    };
    if ok {
        Ok(())
    } else {
        Err(ForgeError::InvalidFile {
            path: file.path.clone(),
            reason: kind.rejection().to_string(),
        })
    }
}

/// A `.pdf` whose first bytes are not `%PDF` is rejected too. Short or
/// unreadable files are left for the server to judge.
fn has_pdf_magic(path: &Path) -> bool {
    use std::io::Read;
    let Ok(mut f) = std::fs::File::open(path) else {
        return true;
    };
    let mut magic = [0u8; 4];
    match f.read_exact(&mut magic) {
        Ok(()) => &magic == b"%PDF",
        Err(_) => true,
    }
}

fn extension_of(name: &str) -> String {
    Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}
