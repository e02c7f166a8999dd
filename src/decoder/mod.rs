//! HTTP/1.1 レスポンスデコーダーモジュール
//!
//! Sans I/O 設計に基づくストリーミングデコーダーを提供。
//! トランスポートはソケットから読んだバイト列をそのまま渡し、
//! ボディは `peek_body()` / `consume_body()` で必要な分だけ取り出す。
//! chunked ではチャンクサイズ行の処理が `progress()` で行われるため、
//! `peek_body()` が `None` の間は `progress()` を呼んで状態を進める。
//!
//! ## 使い方
//!
//! ```rust
//! use shiguredo_http11_transport::{BodyKind, BodyProgress, ResponseDecoder};
//!
//! let mut decoder = ResponseDecoder::new();
//! decoder
//!     .feed(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello")
//!     .unwrap();
//!
//! let (head, body_kind) = decoder.decode_headers().unwrap().unwrap();
//! assert_eq!(head.status_code, 200);
//! assert_eq!(body_kind, BodyKind::ContentLength(5));
//!
//! let mut body = Vec::new();
//! while let Some(data) = decoder.peek_body() {
//!     body.extend_from_slice(data);
//!     let len = data.len();
//!     if let BodyProgress::Complete { .. } = decoder.consume_body(len).unwrap() {
//!         break;
//!     }
//! }
//! assert_eq!(body, b"hello");
//! ```

mod body;
mod head;
mod phase;
mod response;

pub use body::{BodyKind, BodyProgress};
pub(crate) use body::{is_valid_field_value, is_valid_header_name, parse_content_length_value};
pub use head::{HttpVersion, ResponseHead, StatusLine, parse_status_line};
pub use response::ResponseDecoder;
