//! Events that drive a wizard session

use super::state::WizardField;
use crate::chat::MessageId;

/// Inputs accepted by an open wizard session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A correlated free-text reply; `message_id` is the reply itself
    TextReply { text: String, message_id: MessageId },

    /// A suggestion button press; `message_id` is the suggestion message
    CandidatePicked {
        field: WizardField,
        candidate_id: i64,
        message_id: MessageId,
    },
}
