//! Message bus interface.
//!
//! Connection management, acknowledgement and redelivery belong to the
//! transport behind this trait.

use async_trait::async_trait;

use crate::Result;
use crate::binding::Binding;
use crate::event::InboundMessage;

#[async_trait]
pub trait Listener: Send {
    /// Subscribe to messages matching `binding`.
    async fn bind(&mut self, binding: Binding) -> Result<()>;

    /// Wait for the next delivered message. `Ok(None)` means the stream has
    /// ended.
    async fn next(&mut self) -> Result<Option<InboundMessage>>;
}
