use std::path::Path;

const FALLBACK_FILE_NAME: &str = "unnamed_file";
const FALLBACK_EXTENSION: &str = ".bin";
const INVALID_NAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

const EXPORT_TYPES: &[&str] = &[
    "doc", "docx", "xlsx", "xls", "pptx", "ppt", "pdf", "sheet", "slide", "bitable",
];
const DIRECT_TYPES: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "mp4", "mp3", "zip", "rar",
];

/// How a listed entry is handled by the walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadRoute {
    Folder,
    File(FileRoute),
}

/// How a non-folder entry is fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileRoute {
    Export,
    Direct,
    /// Unknown kind: direct download first, export task if that fails.
    DirectThenExport,
}

impl DownloadRoute {
    pub fn for_type(file_type: &str) -> Self {
        let file_type = file_type.to_ascii_lowercase();
        if file_type == "folder" {
            Self::Folder
        } else if EXPORT_TYPES.contains(&file_type.as_str()) {
            Self::File(FileRoute::Export)
        } else if DIRECT_TYPES.contains(&file_type.as_str()) {
            Self::File(FileRoute::Direct)
        } else {
            Self::File(FileRoute::DirectThenExport)
        }
    }
}

pub fn extension_for_type(file_type: &str) -> Option<&'static str> {
    let ext = match file_type.to_ascii_lowercase().as_str() {
        "docx" => ".docx",
        "doc" => ".doc",
        "xlsx" | "sheet" | "bitable" => ".xlsx",
        "xls" => ".xls",
        "pptx" | "slide" => ".pptx",
        "ppt" => ".ppt",
        "pdf" => ".pdf",
        "txt" => ".txt",
        "jpg" | "jpeg" => ".jpg",
        "png" => ".png",
        "gif" => ".gif",
        "bmp" => ".bmp",
        "mp4" => ".mp4",
        "mp3" => ".mp3",
        "zip" => ".zip",
        "rar" => ".rar",
        _ => return None,
    };
    Some(ext)
}

/// Extension (with leading dot) used for the local copy of an entry.
pub fn resolve_extension(file_type: &str, name: &str) -> String {
    if let Some(ext) = extension_for_type(file_type) {
        return ext.to_string();
    }
    Path::new(name)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_else(|| FALLBACK_EXTENSION.to_string())
}

pub fn local_file_name(name: &str, extension: &str) -> String {
    if name
        .to_lowercase()
        .ends_with(&extension.to_lowercase())
    {
        name.to_string()
    } else {
        format!("{name}{extension}")
    }
}

/// Extension as the export task API expects it: no leading dot, falls back to the type.
pub fn export_extension<'a>(extension: &'a str, file_type: &'a str) -> &'a str {
    let trimmed = extension.trim_start_matches('.');
    if trimmed.is_empty() { file_type } else { trimmed }
}

pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if INVALID_NAME_CHARS.contains(&c) { '_' } else { c })
        .filter(|c| (*c as u32) >= 32)
        .collect();
    match cleaned.trim() {
        "" => FALLBACK_FILE_NAME.to_string(),
        // path components that would leave or repeat the parent directory
        dots @ ("." | "..") => format!("_{dots}"),
        trimmed => trimmed.to_string(),
    }
}
