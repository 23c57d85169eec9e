//! Multipart form construction
//!
//! Every network backend that speaks `multipart/form-data` builds a [`Form`]
//! and hands it to [`serialize`]. The wire encoding is reqwest's multipart
//! writer; file fields are read one at a time in insertion order.

use std::io;
use std::path::{Path, PathBuf};

use http_body_util::BodyExt;
use reqwest::multipart::{self, Part};
use reqwest::Client;
use tracing::debug;

use crate::error::{Result, StoreError};

/// Value carried by a single form field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// Streamed from the given path, sent with the path's base name
    File(PathBuf),
    /// Plain text part
    Text(String),
    /// Rendered as `"true"` / `"false"`
    Boolean(bool),
}

/// One named part of a multipart body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormField {
    pub name: String,
    pub value: FieldValue,
}

/// Ordered list of form fields
///
/// Insertion order is wire order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Form {
    fields: Vec<FormField>,
}

impl Form {
    /// Create an empty form
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a file field
    pub fn add_file(&mut self, name: impl Into<String>, path: impl Into<PathBuf>) {
        self.push(name, FieldValue::File(path.into()));
    }

    /// Append a text field
    pub fn add_text(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.push(name, FieldValue::Text(value.into()));
    }

    /// Append a boolean field
    pub fn add_bool(&mut self, name: impl Into<String>, value: bool) {
        self.push(name, FieldValue::Boolean(value));
    }

    /// Replace the first field named `name`, or append if there is none
    pub fn set_text(&mut self, name: &str, value: impl Into<String>) {
        let value = FieldValue::Text(value.into());
        match self.fields.iter_mut().find(|f| f.name == name) {
            Some(field) => field.value = value,
            None => self.push(name, value),
        }
    }

    fn push(&mut self, name: impl Into<String>, value: FieldValue) {
        self.fields.push(FormField {
            name: name.into(),
            value,
        });
    }

    pub fn fields(&self) -> &[FormField] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Look up the value of the first field named `name`
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.value)
    }
}

/// A form rendered to bytes, ready to send
#[derive(Debug, Clone)]
pub struct SerializedForm {
    /// `multipart/form-data; boundary=...`
    pub content_type: String,
    pub body: Vec<u8>,
}

/// Serialize a form with a freshly generated boundary
///
/// Fails without producing a body if any file field cannot be read.
pub async fn serialize(form: &Form) -> Result<SerializedForm> {
    let multipart = to_multipart(form).await?;
    let content_type = format!("multipart/form-data; boundary={}", multipart.boundary());

    let mut request = Client::builder()
        .build()?
        .post(RENDER_URL)
        .multipart(multipart)
        .build()?;
    let body = match request.body_mut().take() {
        Some(body) => body.collect().await?.to_bytes().to_vec(),
        None => Vec::new(),
    };

    debug!(fields = form.len(), bytes = body.len(), "serialized multipart form");

    Ok(SerializedForm { content_type, body })
}

/// Never contacted; the request is only built to render its body
const RENDER_URL: &str = "http://localhost/";

async fn to_multipart(form: &Form) -> Result<multipart::Form> {
    let mut multipart = multipart::Form::new();

    for field in &form.fields {
        let part = match &field.value {
            FieldValue::File(path) => {
                let bytes = tokio::fs::read(path)
                    .await
                    .map_err(|source| file_error(field, path, source))?;
                Part::bytes(bytes)
                    .file_name(base_name(path))
                    .mime_str(mime_for(path))?
            }
            FieldValue::Text(value) => Part::text(value.clone()),
            FieldValue::Boolean(value) => Part::text(value.to_string()),
        };
        multipart = multipart.part(field.name.clone(), part);
    }

    Ok(multipart)
}

fn mime_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("apk") => "application/vnd.android.package-archive",
        Some("zip") => "application/zip",
        _ => "application/octet-stream",
    }
}

fn file_error(field: &FormField, path: &Path, source: io::Error) -> StoreError {
    StoreError::FormField {
        field: field.name.clone(),
        path: path.to_path_buf(),
        source,
    }
}

pub(crate) fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn boundary(out: &SerializedForm) -> String {
        out.content_type
            .strip_prefix("multipart/form-data; boundary=")
            .unwrap()
            .to_string()
    }

    fn part_count(out: &SerializedForm) -> usize {
        let body = String::from_utf8_lossy(&out.body);
        body.matches(&format!("--{}\r\n", boundary(out))).count()
    }

    #[tokio::test]
    async fn test_empty_form_is_valid() {
        let out = serialize(&Form::new()).await.unwrap();
        assert!(!boundary(&out).is_empty());
        assert_eq!(part_count(&out), 0);
    }

    #[tokio::test]
    async fn test_one_part_per_field() {
        let temp = TempDir::new().unwrap();
        let apk = temp.path().join("app-release.apk");
        std::fs::write(&apk, b"PK\x03\x04binary").unwrap();

        let mut form = Form::new();
        form.add_file("file", &apk);
        form.add_text("message", "nightly build");
        form.add_bool("disable_notify", true);

        let out = serialize(&form).await.unwrap();
        assert_eq!(part_count(&out), 3);

        let text = String::from_utf8_lossy(&out.body);
        assert!(text.contains(
            "Content-Disposition: form-data; name=\"file\"; filename=\"app-release.apk\"\r\n"
        ));
        assert!(text.contains("Content-Type: application/vnd.android.package-archive\r\n"));
        assert!(text.contains("PK\u{3}\u{4}binary\r\n"));
        assert!(text.contains("name=\"message\"\r\n\r\nnightly build\r\n"));
        assert!(text.contains("name=\"disable_notify\"\r\n\r\ntrue\r\n"));
        assert!(text.ends_with(&format!("--{}--\r\n", boundary(&out))));
    }

    #[tokio::test]
    async fn test_fields_keep_insertion_order() {
        let mut form = Form::new();
        form.add_text("b", "2");
        form.add_text("a", "1");
        form.add_bool("c", false);

        let out = serialize(&form).await.unwrap();
        let text = String::from_utf8_lossy(&out.body).into_owned();
        let b = text.find("name=\"b\"").unwrap();
        let a = text.find("name=\"a\"").unwrap();
        let c = text.find("name=\"c\"").unwrap();
        assert!(b < a && a < c);
        assert!(text.contains("name=\"c\"\r\n\r\nfalse\r\n"));
    }

    #[tokio::test]
    async fn test_serialization_is_reproducible_modulo_boundary() {
        let temp = TempDir::new().unwrap();
        let ipa = temp.path().join("App.ipa");
        std::fs::write(&ipa, vec![7u8; 4096]).unwrap();

        let mut form = Form::new();
        form.add_file("file", &ipa);
        form.add_text("release_note", "fixes");

        let first = serialize(&form).await.unwrap();
        let second = serialize(&form).await.unwrap();

        let strip = |s: &SerializedForm| {
            String::from_utf8_lossy(&s.body).replace(&boundary(s), "BOUNDARY")
        };
        assert_eq!(strip(&first), strip(&second));
        assert!(strip(&first).contains("Content-Type: application/octet-stream\r\n"));
    }

    #[tokio::test]
    async fn test_missing_file_fails_whole_form() {
        let mut form = Form::new();
        form.add_text("message", "hello");
        form.add_file("file", "/definitely/not/here.apk");

        let err = serialize(&form).await.unwrap_err();
        match err {
            StoreError::FormField { field, path, .. } => {
                assert_eq!(field, "file");
                assert_eq!(path, PathBuf::from("/definitely/not/here.apk"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_set_text_replaces_existing_field() {
        let mut form = Form::new();
        form.add_text("token", "old");
        form.add_text("message", "m");
        form.set_text("token", "new");
        form.set_text("extra", "x");

        assert_eq!(form.len(), 3);
        assert_eq!(form.get("token"), Some(&FieldValue::Text("new".to_string())));
        assert_eq!(form.fields()[2].name, "extra");
    }

    #[tokio::test]
    async fn test_quotes_in_names_are_encoded() {
        let mut form = Form::new();
        form.add_text("we\"ird", "v");
        let out = serialize(&form).await.unwrap();
        let text = String::from_utf8_lossy(&out.body);
        assert!(text.contains("we%22ird"));
        assert!(!text.contains("name=\"we\"ird\""));
    }
}
