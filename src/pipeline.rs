use crate::error::{WriteError, WriteResult};
use std::io::Write;

/// A LIFO stack of counting byte sinks.
///
/// The bottom of the stack forwards to the final destination. Each frame
/// counts the bytes written through it; the count of the top frame is the
/// current file offset. Frames either forward to the frame below
/// (passthrough, MD5 tee) or terminate the descent (buffer capture,
/// discard).
///
/// Frames must be popped in the reverse order they were activated. An
/// out-of-order pop is an internal error: the writer's layout bookkeeping
/// would be silently wrong if it were allowed.
pub struct PipelineStack<'a> {
    frames: Vec<Frame>,
    dest: &'a mut dyn Write,
    md5: Option<md5::Context>,
    md5_enabled: bool,
    last_id: u64,
}

#[derive(Debug)]
enum FrameKind {
    Bottom,
    Passthrough,
    Discard,
    Buffer,
    Md5Tee,
}

#[derive(Debug)]
struct Frame {
    id: u64,
    kind: FrameKind,
    count: u64,
    buf: Vec<u8>,
}

/// Token for a pushed frame. Must be handed back to [`PipelineStack::pop`];
/// dropping it without popping leaves the frame in place, which the next
/// out-of-order pop will catch.
#[derive(Debug)]
#[must_use = "an activated pipeline frame must be popped"]
pub struct StackHandle {
    id: u64,
}

impl<'a> PipelineStack<'a> {
    pub fn new(dest: &'a mut dyn Write) -> Self {
        PipelineStack {
            frames: vec![Frame {
                id: 1,
                kind: FrameKind::Bottom,
                count: 0,
                buf: Vec::new(),
            }],
            dest,
            md5: None,
            md5_enabled: false,
            last_id: 1,
        }
    }

    /// Byte count of the top frame: the current offset within whatever the
    /// top frame is producing.
    pub fn count(&self) -> u64 {
        self.frames.last().map(|f| f.count).unwrap_or(0)
    }

    /// Push a passthrough frame, or a discarding frame when `discard` is
    /// set.
    pub fn activate(&mut self, discard: bool) -> StackHandle {
        self.push(if discard {
            FrameKind::Discard
        } else {
            FrameKind::Passthrough
        })
    }

    /// Push a frame that captures everything written into a buffer returned
    /// by `pop`.
    pub fn activate_buffer(&mut self) -> StackHandle {
        self.push(FrameKind::Buffer)
    }

    /// Insert an MD5 digesting tee. At most one may exist at a time, and it
    /// must be activated before anything has been written through the
    /// current top.
    pub fn activate_md5(&mut self) -> WriteResult<StackHandle> {
        if self.md5.is_some() {
            return Err(WriteError::internal(
                "MD5 pipeline activated while another is in place",
            ));
        }
        if self.count() != 0 {
            return Err(WriteError::internal(
                "MD5 pipeline activated after bytes were written",
            ));
        }
        self.md5 = Some(md5::Context::new());
        self.md5_enabled = true;
        Ok(self.push(FrameKind::Md5Tee))
    }

    /// Finalize the MD5 tee, returning the 32-character lowercase hex digest
    /// and disabling further hashing.
    pub fn hex_digest(&mut self) -> WriteResult<String> {
        let ctx = self
            .md5
            .as_ref()
            .ok_or_else(|| WriteError::internal("hex_digest called with no MD5 pipeline"))?;
        let digest = format!("{:x}", ctx.clone().compute());
        self.md5_enabled = false;
        Ok(digest)
    }

    /// Pop the top frame. Returns captured bytes for buffer frames, empty
    /// otherwise.
    pub fn pop(&mut self, handle: StackHandle) -> WriteResult<Vec<u8>> {
        let top = self
            .frames
            .last()
            .ok_or_else(|| WriteError::internal("pipeline stack is empty"))?;
        if top.id != handle.id {
            return Err(WriteError::internal(format!(
                "pipeline stack popped out of order (top {}, popping {})",
                top.id, handle.id
            )));
        }
        if self.frames.len() < 2 {
            return Err(WriteError::internal("attempt to pop the bottom pipeline"));
        }
        let Some(frame) = self.frames.pop() else {
            return Err(WriteError::internal("pipeline stack is empty"));
        };
        if matches!(frame.kind, FrameKind::Md5Tee) {
            self.md5 = None;
            self.md5_enabled = false;
        }
        self.dest.flush()?;
        Ok(frame.buf)
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> WriteResult<()> {
        let mut idx = self.frames.len();
        while idx > 0 {
            idx -= 1;
            let kind = {
                let frame = &mut self.frames[idx];
                frame.count += data.len() as u64;
                match frame.kind {
                    FrameKind::Buffer => {
                        frame.buf.extend_from_slice(data);
                        return Ok(());
                    }
                    FrameKind::Discard => return Ok(()),
                    FrameKind::Bottom => FrameKind::Bottom,
                    FrameKind::Passthrough => FrameKind::Passthrough,
                    FrameKind::Md5Tee => FrameKind::Md5Tee,
                }
            };
            match kind {
                FrameKind::Md5Tee => {
                    if self.md5_enabled {
                        if let Some(ctx) = self.md5.as_mut() {
                            ctx.consume(data);
                        }
                    }
                }
                FrameKind::Bottom => {
                    self.dest.write_all(data)?;
                    return Ok(());
                }
                _ => {}
            }
        }
        Ok(())
    }

    pub fn write_str(&mut self, data: &str) -> WriteResult<()> {
        self.write_bytes(data.as_bytes())
    }

    /// Write `count` copies of `ch`.
    pub fn write_pad(&mut self, count: usize, ch: u8) -> WriteResult<()> {
        // Bounded chunks so a large pad does not allocate a large vector.
        let chunk = [ch; 64];
        let mut remaining = count;
        while remaining > 0 {
            let n = remaining.min(chunk.len());
            self.write_bytes(&chunk[..n])?;
            remaining -= n;
        }
        Ok(())
    }

    pub fn finish(&mut self) -> WriteResult<()> {
        self.dest.flush()?;
        Ok(())
    }

    fn push(&mut self, kind: FrameKind) -> StackHandle {
        self.last_id += 1;
        self.frames.push(Frame {
            id: self.last_id,
            kind,
            count: 0,
            buf: Vec::new(),
        });
        StackHandle { id: self.last_id }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bottom_counts_and_forwards() {
        let mut out = Vec::new();
        let mut stack = PipelineStack::new(&mut out);
        stack.write_str("hello").unwrap();
        assert_eq!(stack.count(), 5);
        drop(stack);
        assert_eq!(out, b"hello");
    }

    #[test]
    fn test_buffer_frame_captures() {
        let mut out = Vec::new();
        let mut stack = PipelineStack::new(&mut out);
        stack.write_str("a").unwrap();
        let h = stack.activate_buffer();
        stack.write_str("captured").unwrap();
        assert_eq!(stack.count(), 8);
        let buf = stack.pop(h).unwrap();
        assert_eq!(buf, b"captured");
        stack.write_str("b").unwrap();
        drop(stack);
        assert_eq!(out, b"ab");
    }

    #[test]
    fn test_discard_frame() {
        let mut out = Vec::new();
        let mut stack = PipelineStack::new(&mut out);
        let h = stack.activate(true);
        stack.write_str("gone").unwrap();
        assert_eq!(stack.count(), 4);
        stack.pop(h).unwrap();
        drop(stack);
        assert!(out.is_empty());
    }

    #[test]
    fn test_out_of_order_pop_is_error() {
        let mut out = Vec::new();
        let mut stack = PipelineStack::new(&mut out);
        let h1 = stack.activate(false);
        let _h2 = stack.activate(false);
        assert!(stack.pop(h1).is_err());
    }

    #[test]
    fn test_md5_tee_digest() {
        let mut out = Vec::new();
        let mut stack = PipelineStack::new(&mut out);
        let h = stack.activate_md5().unwrap();
        stack.write_str("abc").unwrap();
        let digest = stack.hex_digest().unwrap();
        assert_eq!(digest, "900150983cd24fb0d6963f7d28e17f72");
        // Disabled after digest: further writes do not change it.
        stack.write_str("more").unwrap();
        assert_eq!(stack.hex_digest().unwrap(), digest);
        stack.pop(h).unwrap();
        drop(stack);
        assert_eq!(out, b"abcmore");
    }
}
