use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("invalid chat request: {0}")]
    InvalidChatRequest(String),

    #[error("message text is required")]
    EmptyMessage,

    #[error("this user has chat turned off")]
    ChatDisabled,

    #[error("this partner only accepts chats from other partners")]
    ChatRestricted,

    #[error("not authorized for this chat")]
    NotAuthorized,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl ChatError {
    /// Stable tag reported to clients alongside the message.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::InvalidChatRequest(_) => "invalid_chat_request",
            Self::EmptyMessage => "empty_message",
            Self::ChatDisabled => "chat_disabled",
            Self::ChatRestricted => "chat_restricted",
            Self::NotAuthorized => "not_authorized",
            Self::NotFound(_) => "not_found",
            Self::Storage(_) => "internal",
        }
    }
}
