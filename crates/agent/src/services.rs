use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("service `{0}` is not connected")]
    NotConnected(String),
    #[error("service call failed: {0}")]
    Failed(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailSummary {
    pub id: String,
    pub sender: String,
    pub subject: String,
    pub snippet: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DriveFile {
    pub id: String,
    pub name: String,
    pub link: String,
}

/// Read-mostly external workspace integrations (mail search, document
/// storage). Concrete clients live outside this crate; the agent only sees
/// this seam.
#[async_trait]
pub trait WorkspaceServices: Send + Sync {
    fn has_gmail(&self) -> bool;
    fn has_drive(&self) -> bool;

    async fn search_email(&self, query: &str) -> Result<Vec<EmailSummary>, ServiceError>;
    async fn read_email(&self, id: &str) -> Result<String, ServiceError>;
    async fn unread_emails(&self, limit: usize) -> Result<Vec<EmailSummary>, ServiceError>;
    async fn create_doc(&self, title: &str, content: &str) -> Result<String, ServiceError>;
    async fn list_files(&self, query: &str) -> Result<Vec<DriveFile>, ServiceError>;
}

pub fn format_email_results(emails: &[EmailSummary]) -> String {
    if emails.is_empty() {
        return "No emails found.".to_string();
    }

    let mut lines = Vec::with_capacity(emails.len());
    for email in emails {
        lines.push(format!("- {} — {} ({})", email.sender, email.subject, email.snippet));
    }
    lines.join("\n")
}

pub fn format_file_results(files: &[DriveFile]) -> String {
    if files.is_empty() {
        return "No files found.".to_string();
    }

    let mut lines = Vec::with_capacity(files.len());
    for file in files {
        lines.push(format!("- {} ({})", file.name, file.link));
    }
    lines.join("\n")
}
