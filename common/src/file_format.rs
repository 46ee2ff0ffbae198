use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum FileFormatError {
    #[error("Failed to get file extension")]
    MissingFileExtension,
    #[error("Unsupported file extension for file: {0}")]
    UnsupportedFileExtension(String),
    #[error("YAML serialization failed")]
    Yaml(#[from] serde_yml::Error),
    #[error("JSON serialization failed")]
    Json(#[from] serde_json::Error),
}

pub type FileFormatResult<T> = Result<T, FileFormatError>;

pub fn get_file_extension(filename: &str) -> Option<&str> {
    Path::new(filename)
        .extension()
        .and_then(|os_str| os_str.to_str())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileFormat {
    Yaml,
    Json,
}

impl FileFormat {
    pub fn from_file_name(file_name: &str) -> FileFormatResult<Self> {
        let ext = get_file_extension(file_name).ok_or(FileFormatError::MissingFileExtension)?;

        if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") {
            Ok(Self::Yaml)
        } else if ext.eq_ignore_ascii_case("json") {
            Ok(Self::Json)
        } else {
            Err(FileFormatError::UnsupportedFileExtension(
                file_name.to_string(),
            ))
        }
    }
}

pub fn serialize<T: Serialize>(value: &T, format: FileFormat) -> FileFormatResult<String> {
    match format {
        FileFormat::Yaml => Ok(serde_yml::to_string(value)?),
        FileFormat::Json => Ok(serde_json::to_string_pretty(value)?),
    }
}

pub fn deserialize<T: DeserializeOwned>(text: &str, format: FileFormat) -> FileFormatResult<T> {
    match format {
        FileFormat::Yaml => Ok(serde_yml::from_str(text)?),
        FileFormat::Json => Ok(serde_json::from_str(text)?),
    }
}
