#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("failed to serialize stanza: {0}")]
    Serialize(String),

    #[error("wire send failed: transport channel closed")]
    WireSendFailed,

    #[error("wire send failed: outbound stanza queue is full")]
    WireFull,
}
