//! Streaming sinks
//!
//! A sink receives resources one at a time while a listing is still running.
//! The collector only ever calls a sink from its consumer loop, so
//! implementations do not need to be `Sync`.

use super::model::Resource;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::io::Write;
use tokio::sync::mpsc;

#[async_trait]
pub trait Sink: Send {
    /// Accept one resource. An error aborts the whole describe call.
    async fn send(&mut self, resource: Resource) -> Result<()>;
}

/// Adapts a synchronous closure into a sink
pub struct FnSink<F>(pub F);

#[async_trait]
impl<F> Sink for FnSink<F>
where
    F: FnMut(Resource) -> Result<()> + Send,
{
    async fn send(&mut self, resource: Resource) -> Result<()> {
        (self.0)(resource)
    }
}

/// Writes each resource as one JSON document per line
pub struct JsonLinesSink<W: Write + Send> {
    writer: W,
    written: usize,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<W: Write + Send> Sink for JsonLinesSink<W> {
    async fn send(&mut self, resource: Resource) -> Result<()> {
        serde_json::to_writer(&mut self.writer, &resource)
            .with_context(|| format!("Failed to serialize resource {}", resource.id))?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        self.written += 1;
        Ok(())
    }
}

/// Forwards resources to another task
pub struct ChannelSink {
    tx: mpsc::Sender<Resource>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<Resource>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl Sink for ChannelSink {
    async fn send(&mut self, resource: Resource) -> Result<()> {
        self.tx
            .send(resource)
            .await
            .map_err(|e| anyhow::anyhow!("Receiver dropped before resource {}", e.0.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::describer::model::Description;
    use serde_json::json;

    fn resource(id: &str) -> Resource {
        Resource::new(id, id, Description::from(json!({ "id": id })))
    }

    #[tokio::test]
    async fn test_json_lines_sink_writes_one_line_per_resource() {
        let mut sink = JsonLinesSink::new(Vec::new());
        sink.send(resource("a")).await.unwrap();
        sink.send(resource("b")).await.unwrap();
        assert_eq!(sink.written(), 2);

        let out = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: Resource = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.id, "a");
    }

    #[tokio::test]
    async fn test_channel_sink_fails_when_receiver_gone() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let mut sink = ChannelSink::new(tx);
        let err = sink.send(resource("lost")).await.unwrap_err();
        assert!(err.to_string().contains("lost"));
    }

    #[test]
    fn test_fn_sink_propagates_closure_error() {
        let mut sink = FnSink(|r: Resource| {
            if r.id == "bad" {
                anyhow::bail!("rejected");
            }
            Ok(())
        });
        tokio_test::assert_ok!(tokio_test::block_on(sink.send(resource("good"))));
        tokio_test::assert_err!(tokio_test::block_on(sink.send(resource("bad"))));
    }
}
