//! The model-client seam.
//!
//! The hosted language model is an opaque capability: submit one
//! conversational turn with the accumulated history, receive reply text.
//! Parsing and validating the reply is the caller's job, not the client's.

use async_trait::async_trait;
use augur_core::error::Result;
use augur_core::session::ConversationTurn;

/// A client for a hosted conversational language model.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Submits one conversational turn and returns the model's reply text.
    ///
    /// `history` is the full prior dialogue, oldest first; `turn` is the new
    /// user turn. Transport and service faults surface as
    /// [`augur_core::AugurError::UpstreamModel`].
    async fn generate(
        &self,
        system_instruction: &str,
        history: &[ConversationTurn],
        turn: &str,
    ) -> Result<String>;
}
