//! メモリ上のバイト列を読むストリーム

use crate::context::Context;
use crate::error::Result;

use super::BodyStream;

/// 呼び出し側のバッファを借用して読むストリーム
///
/// データは所有しない。`rewind` は位置を 0 に戻すだけ。
#[derive(Debug, Clone)]
pub struct MemoryBodyStream<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> MemoryBodyStream<'a> {
    /// バイト列からストリームを作成
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    /// 未読のバイト数
    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }
}

impl BodyStream for MemoryBodyStream<'_> {
    fn length(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }

    fn rewind(&mut self) -> Result<()> {
        self.offset = 0;
        Ok(())
    }

    fn on_read(&mut self, _ctx: &Context, buf: &mut [u8]) -> Result<usize> {
        let n = buf.len().min(self.remaining());
        buf[..n].copy_from_slice(&self.data[self.offset..self.offset + n]);
        self.offset += n;
        Ok(n)
    }
}

/// 長さ 0 のストリーム
///
/// ボディのないリクエストに使う。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NullBodyStream;

impl NullBodyStream {
    pub fn new() -> Self {
        Self
    }
}

impl BodyStream for NullBodyStream {
    fn length(&self) -> Option<u64> {
        Some(0)
    }

    fn rewind(&mut self) -> Result<()> {
        Ok(())
    }

    fn on_read(&mut self, _ctx: &Context, _buf: &mut [u8]) -> Result<usize> {
        Ok(0)
    }
}
