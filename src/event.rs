use serde::{Deserialize, Serialize};

/// Inbound-mail notification batch, one record per received message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailEvent {
    #[serde(rename = "Records", default)]
    pub records: Vec<MailEventRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailEventRecord {
    pub ses: SesPayload,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SesPayload {
    pub mail: MailMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailMetadata {
    #[serde(default)]
    pub timestamp: String,
    pub message_id: String,
}

impl MailEventRecord {
    pub fn message_id(&self) -> &str {
        &self.ses.mail.message_id
    }
}

impl MailEvent {
    pub fn from_json(raw: &str) -> Result<Self, String> {
        serde_json::from_str(raw).map_err(|e| format!("invalid mail event json: {e}"))
    }

    pub fn message_ids(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(MailEventRecord::message_id)
    }
}
