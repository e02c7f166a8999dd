//! ボディストリーム
//!
//! リクエストボディとレスポンスボディの両方に使う、キャンセル可能な逐次読み取りの契約。
//!
//! ## 使い方
//!
//! ```rust
//! use shiguredo_http11_transport::{BodyStream, Context, MemoryBodyStream, read_to_end};
//!
//! let data = b"Hello World!";
//! let ctx = Context::new();
//! let mut stream = MemoryBodyStream::new(data);
//! assert_eq!(stream.length(), Some(12));
//!
//! let mut buf = [0u8; 5];
//! assert_eq!(stream.read(&ctx, &mut buf).unwrap(), 5);
//! assert_eq!(&buf, b"Hello");
//!
//! // リトライ前に先頭へ戻す
//! stream.rewind().unwrap();
//! assert_eq!(read_to_end(&ctx, &mut stream).unwrap(), data);
//! ```

mod file;
mod limit;
mod memory;

pub use file::FileBodyStream;
pub use limit::LimitBodyStream;
pub use memory::{MemoryBodyStream, NullBodyStream};

use crate::context::Context;
use crate::error::{Error, Result};

/// `read_to_end` が 1 回の読み取りに使うバッファサイズ
const READ_TO_END_CHUNK: usize = 8 * 1024;

/// キャンセル可能な逐次バイト列
///
/// 実装側は `on_read` を提供する。呼び出し側は `read` を使う。
pub trait BodyStream {
    /// 宣言された全体の長さ
    ///
    /// `None` は長さ不明。その場合は `read` が 0 を返すまで読む。
    fn length(&self) -> Option<u64>;

    /// 先頭に戻す (リトライでまったく同じバイト列を再送するため)
    ///
    /// 巻き戻せないストリームは `Error::NotSupported` を返す。何もせず成功してはならない。
    fn rewind(&mut self) -> Result<()> {
        Err(Error::NotSupported(
            "this body stream cannot be rewound, which is required to resend it on retry; \
             buffer it into a MemoryBodyStream or use a FileBodyStream"
                .to_string(),
        ))
    }

    /// `buf` に最大 `buf.len()` バイトを読み取る
    ///
    /// `read` から呼ばれる。キャンセル確認と空バッファの判定は済んでいる。
    fn on_read(&mut self, ctx: &Context, buf: &mut [u8]) -> Result<usize>;

    /// `buf` に最大 `buf.len()` バイトを読み取る
    ///
    /// I/O の前に `ctx` を確認し、キャンセル済みなら何も読まずに `Error::Cancelled` を返す。
    /// 0 を返すのはストリームが終端に達したときだけ (空の `buf` を除く)。
    fn read(&mut self, ctx: &Context, buf: &mut [u8]) -> Result<usize> {
        ctx.check()?;
        if buf.is_empty() {
            return Ok(0);
        }
        self.on_read(ctx, buf)
    }
}

impl<S: BodyStream + ?Sized> BodyStream for &mut S {
    fn length(&self) -> Option<u64> {
        (**self).length()
    }

    fn rewind(&mut self) -> Result<()> {
        (**self).rewind()
    }

    fn on_read(&mut self, ctx: &Context, buf: &mut [u8]) -> Result<usize> {
        (**self).on_read(ctx, buf)
    }

    fn read(&mut self, ctx: &Context, buf: &mut [u8]) -> Result<usize> {
        (**self).read(ctx, buf)
    }
}

impl<S: BodyStream + ?Sized> BodyStream for Box<S> {
    fn length(&self) -> Option<u64> {
        (**self).length()
    }

    fn rewind(&mut self) -> Result<()> {
        (**self).rewind()
    }

    fn on_read(&mut self, ctx: &Context, buf: &mut [u8]) -> Result<usize> {
        (**self).on_read(ctx, buf)
    }

    fn read(&mut self, ctx: &Context, buf: &mut [u8]) -> Result<usize> {
        (**self).read(ctx, buf)
    }
}

/// `buf` が埋まるか終端に達するまで読み取る
///
/// 反復ごとに `ctx` を確認する。読み取ったバイト数を返す。
pub fn read_to_count<S: BodyStream + ?Sized>(
    ctx: &Context,
    body: &mut S,
    buf: &mut [u8],
) -> Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        let n = body.read(ctx, &mut buf[total..])?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}

/// 終端まで読み取り、全体を返す
///
/// 長さが分かっている場合はその分だけ先に確保する。
pub fn read_to_end<S: BodyStream + ?Sized>(ctx: &Context, body: &mut S) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    if let Some(len) = body.length() {
        // 宣言された長さは信用しすぎない
        out.reserve(usize::try_from(len).unwrap_or(0).min(16 * 1024 * 1024));
    }
    let mut chunk = vec![0u8; READ_TO_END_CHUNK];
    loop {
        let n = body.read(ctx, &mut chunk)?;
        if n == 0 {
            return Ok(out);
        }
        out.extend_from_slice(&chunk[..n]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 1 回の読み取りで最大 `step` バイトしか返さないストリーム
    struct Trickle {
        data: Vec<u8>,
        pos: usize,
        step: usize,
        reads: usize,
    }

    impl BodyStream for Trickle {
        fn length(&self) -> Option<u64> {
            None
        }

        fn on_read(&mut self, _ctx: &Context, buf: &mut [u8]) -> Result<usize> {
            self.reads += 1;
            let n = buf.len().min(self.step).min(self.data.len() - self.pos);
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    fn trickle(data: &[u8], step: usize) -> Trickle {
        Trickle {
            data: data.to_vec(),
            pos: 0,
            step,
            reads: 0,
        }
    }

    #[test]
    fn default_rewind_is_not_supported() {
        let mut s = trickle(b"abc", 1);
        assert!(matches!(s.rewind(), Err(Error::NotSupported(_))));
    }

    #[test]
    fn read_checks_cancellation_before_io() {
        let ctx = Context::new();
        ctx.cancel();
        let mut s = trickle(b"abc", 3);
        let mut buf = [0u8; 3];
        assert!(matches!(s.read(&ctx, &mut buf), Err(Error::Cancelled)));
        assert_eq!(s.reads, 0);
        assert_eq!(buf, [0, 0, 0]);
    }

    #[test]
    fn read_with_empty_buffer_is_noop() {
        let mut s = trickle(b"abc", 3);
        assert_eq!(s.read(&Context::new(), &mut []).unwrap(), 0);
        assert_eq!(s.reads, 0);
    }

    #[test]
    fn read_to_count_fills_buffer_across_short_reads() {
        let ctx = Context::new();
        let mut s = trickle(b"Hello World!", 2);
        let mut buf = [0u8; 7];
        assert_eq!(read_to_count(&ctx, &mut s, &mut buf).unwrap(), 7);
        assert_eq!(&buf, b"Hello W");
        assert_eq!(s.reads, 4);
    }

    #[test]
    fn read_to_count_stops_at_end() {
        let ctx = Context::new();
        let mut s = trickle(b"abc", 2);
        let mut buf = [0u8; 10];
        assert_eq!(read_to_count(&ctx, &mut s, &mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], b"abc");
    }

    /// 読み取るたびにコンテキストをキャンセルするストリーム
    struct CancelAfterFirstRead {
        ctx: Context,
        inner: Trickle,
    }

    impl BodyStream for CancelAfterFirstRead {
        fn length(&self) -> Option<u64> {
            None
        }

        fn on_read(&mut self, ctx: &Context, buf: &mut [u8]) -> Result<usize> {
            let n = self.inner.on_read(ctx, buf)?;
            self.ctx.cancel();
            Ok(n)
        }
    }

    #[test]
    fn read_to_count_checks_cancellation_every_iteration() {
        let ctx = Context::new();
        let mut s = CancelAfterFirstRead {
            ctx: ctx.clone(),
            inner: trickle(b"Hello World!", 2),
        };
        let mut buf = [0u8; 12];
        assert!(matches!(
            read_to_count(&ctx, &mut s, &mut buf),
            Err(Error::Cancelled)
        ));
        assert_eq!(s.inner.reads, 1);
    }

    #[test]
    fn read_to_end_collects_everything() {
        let ctx = Context::new();
        let data: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
        let mut s = trickle(&data, 4096);
        assert_eq!(read_to_end(&ctx, &mut s).unwrap(), data);
    }

    #[test]
    fn boxed_and_borrowed_streams_forward() {
        let ctx = Context::new();
        let mut boxed: Box<dyn BodyStream> = Box::new(trickle(b"xyz", 1));
        assert_eq!(read_to_end(&ctx, &mut boxed).unwrap(), b"xyz");
        let mut inner = trickle(b"abc", 3);
        let mut borrowed = &mut inner;
        assert_eq!(read_to_end(&ctx, &mut borrowed).unwrap(), b"abc");
    }
}
