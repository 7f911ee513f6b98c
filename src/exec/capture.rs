// src/exec/capture.rs

//! Bounded output capture.
//!
//! Each reader task drains one pipe until EOF. Bytes are kept up to the cap;
//! anything beyond is counted and discarded so the pipe keeps flowing and the
//! child never blocks on a full buffer.

use std::sync::{Arc, Mutex};

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

use crate::exec::progress::LineObserver;
use crate::exec::result::Captured;
use crate::types::Stream;

const READ_CHUNK: usize = 8 * 1024;

/// Longest line handed to a [`LineObserver`]; longer lines are cut.
pub const MAX_OBSERVED_LINE: usize = 8 * 1024;

/// Output buffer with a hard byte cap.
#[derive(Debug)]
pub struct CaptureBuffer {
    data: Vec<u8>,
    cap: usize,
    total: u64,
    truncated: bool,
}

impl CaptureBuffer {
    pub fn new(cap: usize) -> Self {
        Self {
            data: Vec::with_capacity(cap.min(READ_CHUNK)),
            cap,
            total: 0,
            truncated: false,
        }
    }

    /// Append a chunk, keeping at most `cap` bytes overall.
    pub fn push(&mut self, chunk: &[u8]) {
        self.total += chunk.len() as u64;

        let room = self.cap.saturating_sub(self.data.len());
        if chunk.len() > room {
            self.truncated = true;
        }
        let keep = chunk.len().min(room);
        self.data.extend_from_slice(&chunk[..keep]);
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn finish(self) -> Captured {
        Captured {
            bytes: self.data,
            total_bytes: self.total,
            truncated: self.truncated,
        }
    }
}

/// Shared handle so merged capture can feed two readers into one buffer.
pub type SharedBuffer = Arc<Mutex<CaptureBuffer>>;

pub fn shared(cap: usize) -> SharedBuffer {
    Arc::new(Mutex::new(CaptureBuffer::new(cap)))
}

/// Take the buffer back out of its shared handle once all readers are done.
///
/// If a reader is somehow still holding a clone, its contents are copied.
pub fn into_captured(buffer: SharedBuffer) -> Captured {
    match Arc::try_unwrap(buffer) {
        Ok(mutex) => mutex
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .finish(),
        Err(shared) => {
            let guard = shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            Captured {
                bytes: guard.data.clone(),
                total_bytes: guard.total,
                truncated: guard.truncated,
            }
        }
    }
}

/// Splits a byte stream into lines for a [`LineObserver`].
///
/// Lines longer than [`MAX_OBSERVED_LINE`] are cut at the limit and the rest
/// of that line is skipped.
#[derive(Debug, Default)]
pub struct LineSplitter {
    line: Vec<u8>,
}

impl LineSplitter {
    pub fn feed(&mut self, chunk: &[u8], mut emit: impl FnMut(&str)) {
        for &b in chunk {
            if b == b'\n' {
                self.flush(&mut emit);
                continue;
            }
            if self.line.len() < MAX_OBSERVED_LINE {
                self.line.push(b);
            }
        }
    }

    /// Emit a trailing line without a newline (called at EOF).
    pub fn finish(mut self, mut emit: impl FnMut(&str)) {
        if !self.line.is_empty() {
            self.flush(&mut emit);
        }
    }

    fn flush(&mut self, emit: &mut impl FnMut(&str)) {
        if self.line.last() == Some(&b'\r') {
            self.line.pop();
        }
        let text = String::from_utf8_lossy(&self.line);
        emit(&text);
        self.line.clear();
    }
}

/// Drain `reader` into `buffer` until EOF or a read error.
pub async fn pump<R>(
    mut reader: R,
    stream: Stream,
    buffer: SharedBuffer,
    observer: Option<LineObserver>,
) where
    R: AsyncRead + Unpin,
{
    let mut chunk = vec![0u8; READ_CHUNK];
    let mut splitter = observer.as_ref().map(|_| LineSplitter::default());

    loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                trace!(%stream, error = %e, "read error; stopping capture");
                break;
            }
        };

        {
            let mut guard = buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            guard.push(&chunk[..n]);
        }

        if let (Some(splitter), Some(observer)) = (splitter.as_mut(), observer.as_ref()) {
            splitter.feed(&chunk[..n], |line| observer(stream, line));
        }
    }

    if let (Some(splitter), Some(observer)) = (splitter, observer.as_ref()) {
        splitter.finish(|line| observer(stream, line));
    }

    trace!(%stream, "capture reached EOF");
}
