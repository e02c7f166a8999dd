//! 別のストリームを最大 N バイトに制限するストリーム

use crate::context::Context;
use crate::error::Result;

use super::BodyStream;

/// 内側のストリームを借用し、最大 `max_length` バイトだけ読ませるストリーム
///
/// 長さは `min(inner.length(), max_length)`。内側の長さが不明なら不明のまま。
#[derive(Debug)]
pub struct LimitBodyStream<'a, S: BodyStream + ?Sized> {
    inner: &'a mut S,
    cap: u64,
    length: Option<u64>,
    bytes_read: u64,
}

impl<'a, S: BodyStream + ?Sized> LimitBodyStream<'a, S> {
    /// `inner` を `max_length` バイトに制限する
    pub fn new(inner: &'a mut S, max_length: u64) -> Self {
        let length = inner.length().map(|len| len.min(max_length));
        Self {
            inner,
            cap: length.unwrap_or(max_length),
            length,
            bytes_read: 0,
        }
    }

    /// これまでに読み取ったバイト数
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }
}

impl<S: BodyStream + ?Sized> BodyStream for LimitBodyStream<'_, S> {
    fn length(&self) -> Option<u64> {
        self.length
    }

    fn rewind(&mut self) -> Result<()> {
        self.inner.rewind()?;
        self.bytes_read = 0;
        Ok(())
    }

    fn on_read(&mut self, ctx: &Context, buf: &mut [u8]) -> Result<usize> {
        let remaining = self.cap - self.bytes_read;
        if remaining == 0 {
            return Ok(0);
        }
        let want = usize::try_from(remaining).map_or(buf.len(), |r| r.min(buf.len()));
        let n = self.inner.read(ctx, &mut buf[..want])?;
        self.bytes_read += n as u64;
        Ok(n)
    }
}
