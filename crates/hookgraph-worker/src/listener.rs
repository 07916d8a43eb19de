//! A listener reading one JSON message per line.
//!
//! Stands in for a broker connection: whatever relays the bus writes
//! [`InboundMessage`] objects to the worker's stdin.

use async_trait::async_trait;
use hookgraph_core::binding::Binding;
use hookgraph_core::bus::Listener;
use hookgraph_core::event::InboundMessage;
use hookgraph_core::{Error, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{debug, warn};

pub struct JsonLinesListener<R> {
    lines: Lines<R>,
    bindings: Vec<Binding>,
}

impl<R: AsyncBufRead + Unpin + Send> JsonLinesListener<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            bindings: Vec::new(),
        }
    }
}

impl JsonLinesListener<BufReader<Stdin>> {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

/// Whether `binding` delivers `message`, either by its own routing key or by
/// one of the routes it was carbon copied to.
fn delivers(binding: &Binding, message: &InboundMessage) -> bool {
    binding.matches(&message.exchange, &message.routing_key)
        || message
            .routes
            .iter()
            .any(|route| binding.matches(&message.exchange, &format!("route.{}", route)))
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> Listener for JsonLinesListener<R> {
    async fn bind(&mut self, binding: Binding) -> Result<()> {
        self.bindings.push(binding);
        Ok(())
    }

    async fn next(&mut self) -> Result<Option<InboundMessage>> {
        loop {
            let line = self
                .lines
                .next_line()
                .await
                .map_err(|e| Error::Transport(e.to_string()))?;
            let Some(line) = line else {
                return Ok(None);
            };

            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let message: InboundMessage = match serde_json::from_str(line) {
                Ok(message) => message,
                Err(e) => {
                    warn!(error = %e, "Skipping unparseable message");
                    continue;
                }
            };

            if self.bindings.iter().any(|binding| delivers(binding, &message)) {
                return Ok(Some(message));
            }

            debug!(
                exchange = %message.exchange,
                routing_key = %message.routing_key,
                "No binding matches message"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INPUT: &str = concat!(
        r#"{"exchange": "exchange/test/v1/push", "routingKey": "primary.acme.widgets._", "#,
        r#""payload": {}}"#,
        "\n",
        "not json\n",
        r#"{"exchange": "exchange/test/v1/push", "routingKey": "other.acme.widgets._", "#,
        r#""payload": {}}"#,
        "\n",
        r#"{"exchange": "exchange/test/v1/state", "routingKey": "primary.graph", "#,
        r#""routes": ["gh.acme.widgets.abc"], "payload": {"n": 3}}"#,
        "\n",
    );

    #[tokio::test]
    async fn test_delivers_bound_messages_only() {
        let mut listener = JsonLinesListener::new(INPUT.as_bytes());
        listener
            .bind(Binding::new("exchange/test/v1/push", "primary.*.*.*"))
            .await
            .unwrap();
        listener
            .bind(Binding::new("exchange/test/v1/state", "route.gh.*.*.*"))
            .await
            .unwrap();

        let first = listener.next().await.unwrap().unwrap();
        assert_eq!(first.routing_key, "primary.acme.widgets._");

        let second = listener.next().await.unwrap().unwrap();
        assert_eq!(second.exchange, "exchange/test/v1/state");
        assert_eq!(second.payload["n"], 3);

        assert!(listener.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unbound_listener_delivers_nothing() {
        let mut listener = JsonLinesListener::new(INPUT.as_bytes());
        assert!(listener.next().await.unwrap().is_none());
    }
}
