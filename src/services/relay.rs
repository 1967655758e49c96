use std::convert::Infallible;

use axum::response::sse::Event;
use futures::{Stream, StreamExt};
use tracing::{debug, error};

use crate::models::StreamChunk;

/// Frames chunks as SSE events. Ends right after the first terminal chunk and
/// supplies an error terminal if the source dries up without one.
pub fn relay<S>(chunks: S) -> impl Stream<Item = Result<Event, Infallible>> + Send
where
    S: Stream<Item = StreamChunk> + Send + 'static,
{
    frame(chunks).map(|chunk| Ok(Event::default().data(chunk.to_event_data())))
}

/// The chunk sequence the relay writes, terminal included.
pub fn frame<S>(chunks: S) -> impl Stream<Item = StreamChunk> + Send
where
    S: Stream<Item = StreamChunk> + Send + 'static,
{
    async_stream::stream! {
        let mut chunks = Box::pin(chunks);
        let mut relayed = 0usize;

        while let Some(chunk) = chunks.next().await {
            let terminal = chunk.is_terminal();
            if !terminal {
                relayed += 1;
            }
            yield chunk;
            if terminal {
                debug!(chunks = relayed, "Relay closed");
                return;
            }
        }

        error!(chunks = relayed, "Analysis stream ended without a terminal marker");
        yield StreamChunk::Error("Internal server error: analysis ended unexpectedly".to_string());
    }
}
