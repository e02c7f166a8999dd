//! # shiguredo_http11_transport
//!
//! キャンセル可能なボディストリームを持つブロッキング HTTP/1.1 トランスポート
//!
//! ## 特徴
//!
//! - **ボディストリーム**: メモリ、ファイル範囲、長さ制限、接続に結び付いたレスポンスボディを
//!   同じ `BodyStream` トレイトで読む
//! - **キャンセル**: すべての読み取りと送信は `Context` を確認し、期限とキャンセルに従う
//! - **リトライ対応**: 巻き戻せるストリームは `rewind()` で同じバイト列を再送できる。
//!   巻き戻せないストリームは `NotSupported` で失敗する
//! - **確実な後始末**: セッション、接続、リクエストの各ハンドルは取得と逆順に一度だけ解放する
//!
//! ## 使い方
//!
//! ### アップロード
//!
//! ```no_run
//! use shiguredo_http11_transport::{
//!     BodyStream, Context, HttpTransport, MemoryBodyStream, Method, Request, Transport,
//! };
//!
//! # fn main() -> shiguredo_http11_transport::Result<()> {
//! let transport = Transport::new();
//! let ctx = Context::new();
//! let data = b"Hello World!";
//! let mut body = MemoryBodyStream::new(data);
//!
//! for attempt in 0..3 {
//!     if attempt > 0 {
//!         // 再送前に先頭へ戻す
//!         body.rewind()?;
//!     }
//!     let mut request = Request::parse(Method::Put, "http://127.0.0.1:8080/blob")?
//!         .header("Content-Type", "text/plain")
//!         .body(&mut body);
//!     match transport.send(&ctx, &mut request) {
//!         Ok(response) if response.is_success() => break,
//!         Ok(_) | Err(_) => continue,
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### レスポンスボディをファイルに保存
//!
//! ```no_run
//! use shiguredo_http11_transport::{
//!     BodyStream, Context, FileWriter, HttpTransport, Method, Request, Transport,
//! };
//!
//! # fn main() -> shiguredo_http11_transport::Result<()> {
//! let ctx = Context::new();
//! let mut request = Request::parse(Method::Get, "https://example.com/")?;
//! let mut response = Transport::new().send(&ctx, &mut request)?;
//!
//! let writer = FileWriter::create("index.html")?;
//! let mut buf = vec![0u8; 64 * 1024];
//! let mut offset = 0;
//! loop {
//!     let n = response.body_mut().read(&ctx, &mut buf)?;
//!     if n == 0 {
//!         break;
//!     }
//!     writer.write_at(&buf[..n], offset)?;
//!     offset += n as u64;
//! }
//! # Ok(())
//! # }
//! ```

mod body_stream;
mod context;
mod decoder;
mod encoder;
mod error;
mod file_io;
mod headers;
mod limits;
mod request;
mod response;
mod transport;

pub use body_stream::{
    BodyStream, FileBodyStream, LimitBodyStream, MemoryBodyStream, NullBodyStream, read_to_count,
    read_to_end,
};
pub use context::Context;
pub use decoder::{
    BodyKind, BodyProgress, HttpVersion, ResponseDecoder, ResponseHead, StatusLine,
    parse_status_line,
};
pub use error::{Error, ErrorKind, Phase, ProtocolError, Result};
pub use file_io::{FileReader, FileWriter};
pub use headers::{Headers, validate_header};
pub use limits::DecoderLimits;
pub use request::{Method, Request};
pub use response::RawResponse;
pub use transport::{
    Connection, Connector, DEFAULT_USER_AGENT, HttpTransport, LiveResponseStream, Session,
    TcpConnector, Transport, TransportOptions, TransportState,
};
