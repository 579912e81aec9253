use std::io::{self, Read};
use std::sync::Arc;

use bytes::{Buf, Bytes};
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::runtime::Runtime;

use crate::client::classify;

/// Blocking `Read` over an object_store byte stream
///
/// Each `read` pulls at most one chunk from the network, so a caller polling
/// a cancellation flag between reads observes it promptly. Stream failures
/// keep their remote classification, see [`ClientError::from_read_error`].
///
/// [`ClientError::from_read_error`]: common::client::ClientError::from_read_error
pub(crate) struct BlockingStreamReader {
    runtime: Arc<Runtime>,
    stream: BoxStream<'static, object_store::Result<Bytes>>,
    chunk: Bytes,
}

impl BlockingStreamReader {
    pub(crate) fn new(
        runtime: Arc<Runtime>,
        stream: BoxStream<'static, object_store::Result<Bytes>>,
    ) -> Self {
        Self {
            runtime,
            stream,
            chunk: Bytes::new(),
        }
    }
}

impl Read for BlockingStreamReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.chunk.is_empty() {
            match self.runtime.block_on(self.stream.next()) {
                Some(Ok(bytes)) => self.chunk = bytes,
                Some(Err(e)) => return Err(classify(e).into_read_error()),
                None => return Ok(0),
            }
        }
        let n = buf.len().min(self.chunk.len());
        buf[..n].copy_from_slice(&self.chunk[..n]);
        self.chunk.advance(n);
        Ok(n)
    }
}
