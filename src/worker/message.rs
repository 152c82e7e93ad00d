use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

/// Commands pages post to the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
    SkipWaiting,
    GetVersion,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionReply {
    pub version: String,
}

/// The sending half of a message channel a page hands over with its message.
pub type ReplyPort = oneshot::Sender<VersionReply>;
