use base64::{engine::general_purpose::STANDARD, Engine};
use mailparse::{parse_mail, MailHeaderMap, ParsedMail};
use sha1::{Digest, Sha1};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A fetched notification, reduced to what the pipeline reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMail {
    pub message_id: String,
    pub subject: String,
    pub html_body_base64: String,
    pub fingerprint: String,
}

pub trait MailSource {
    fn get_mail(&self, message_id: &str) -> Result<InboundMail, String>;
}

impl<T: MailSource + ?Sized> MailSource for &T {
    fn get_mail(&self, message_id: &str) -> Result<InboundMail, String> {
        (**self).get_mail(message_id)
    }
}

/// Raw messages stored as one file per message id, optionally with an `.eml` suffix.
#[derive(Debug, Clone)]
pub struct MailDirectory {
    root: PathBuf,
}

impl MailDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve_message_path(&self, message_id: &str) -> Result<PathBuf, String> {
        let id = message_id.trim();
        if id.is_empty() {
            return Err("message id must not be empty".to_string());
        }
        if id.contains(['/', '\\']) || id == "." || id == ".." {
            return Err(format!("message id is not a plain file name: {id}"));
        }
        let exact = self.root.join(id);
        if exact.is_file() {
            return Ok(exact);
        }
        let with_ext = self.root.join(format!("{id}.eml"));
        if with_ext.is_file() {
            return Ok(with_ext);
        }
        Err(format!(
            "no stored message {id} under {}",
            self.root.to_string_lossy()
        ))
    }
}

impl MailSource for MailDirectory {
    fn get_mail(&self, message_id: &str) -> Result<InboundMail, String> {
        let path = self.resolve_message_path(message_id)?;
        read_mail_file(&path, message_id.trim())
    }
}

pub fn read_mail_file(path: &Path, message_id: &str) -> Result<InboundMail, String> {
    let bytes = fs::read(path)
        .map_err(|e| format!("error while reading {}: {e}", path.to_string_lossy()))?;
    inbound_mail_from_bytes(message_id, &bytes)
}

pub fn inbound_mail_from_bytes(message_id: &str, raw: &[u8]) -> Result<InboundMail, String> {
    let mail = parse_mail(raw).map_err(|e| format!("error while parsing email {message_id}: {e}"))?;
    let subject = mail
        .get_headers()
        .get_first_value("Subject")
        .unwrap_or_default()
        .trim()
        .to_string();
    let html = find_html_body(&mail)
        .ok_or_else(|| format!("email {message_id} has no text/html part"))?;

    Ok(InboundMail {
        message_id: message_id.to_string(),
        subject,
        html_body_base64: STANDARD.encode(html.as_bytes()),
        fingerprint: fingerprint(raw),
    })
}

fn find_html_body(mail: &ParsedMail) -> Option<String> {
    if mail.ctype.mimetype.eq_ignore_ascii_case("text/html") {
        if let Ok(body) = mail.get_body() {
            return Some(body);
        }
    }
    mail.subparts.iter().find_map(find_html_body)
}

pub fn fingerprint(raw: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(raw);
    format!("{:x}", hasher.finalize())
}

/// A single `.eml` file, or every `.eml` file below a directory in path order.
pub fn collect_eml_files(input_path: &Path) -> Result<Vec<PathBuf>, String> {
    if !input_path.exists() {
        return Err(format!("path not found: {}", input_path.to_string_lossy()));
    }
    if input_path.is_file() {
        if !is_eml(input_path) {
            return Err("only .eml files or directories containing them are supported".to_string());
        }
        return Ok(vec![input_path.to_path_buf()]);
    }

    let mut files = WalkDir::new(input_path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| is_eml(p))
        .collect::<Vec<_>>();
    files.sort();
    if files.is_empty() {
        return Err(format!(
            "no .eml files under {}",
            input_path.to_string_lossy()
        ));
    }
    Ok(files)
}

/// Message id for a stored file: its name without the `.eml` suffix.
pub fn message_id_for_path(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string()
}

fn is_eml(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|s| s.eq_ignore_ascii_case("eml"))
        .unwrap_or(false)
}
