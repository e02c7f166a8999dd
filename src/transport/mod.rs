//! ブロッキング HTTP/1.1 トランスポート
//!
//! リクエストを送り、ステータス行とヘッダーを受信した時点でレスポンスを返す。
//! ボディは接続に結び付いた `LiveResponseStream` として呼び出し側が読む。
//!
//! ## 使い方
//!
//! ```no_run
//! use std::time::Duration;
//! use shiguredo_http11_transport::{
//!     Context, HttpTransport, Method, Request, Transport, read_to_end,
//! };
//!
//! # fn main() -> shiguredo_http11_transport::Result<()> {
//! let transport = Transport::new().connect_timeout(Duration::from_secs(10));
//! let ctx = Context::new().with_timeout(Duration::from_secs(30));
//!
//! let mut request = Request::parse(Method::Get, "https://example.com/")?;
//! let mut response = transport.send(&ctx, &mut request)?;
//! println!("{} {}", response.status_code(), response.reason_phrase());
//! let body = read_to_end(&ctx, response.body_mut())?;
//! println!("{} bytes", body.len());
//! # Ok(())
//! # }
//! ```

mod connector;
mod exchange;
mod live;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rustls::ClientConfig;

use crate::context::Context;
use crate::decoder::{BodyKind, ResponseHead};
use crate::encoder::{EncodedHead, encode_request_head};
use crate::error::Result;
use crate::headers::Headers;
use crate::limits::DecoderLimits;
use crate::request::{Method, Request};
use crate::response::RawResponse;

pub use connector::{Connection, Connector, Session, TcpConnector};
pub use exchange::TransportState;
pub use live::LiveResponseStream;

use exchange::Exchange;

/// 既定の User-Agent
pub const DEFAULT_USER_AGENT: &str =
    concat!("shiguredo_http11_transport/", env!("CARGO_PKG_VERSION"));

/// トランスポートの設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportOptions {
    /// 接続確立 (TLS ハンドシェイクを含む) のタイムアウト (デフォルト: 30 秒)
    pub connect_timeout: Duration,
    /// データが届かないまま待つ上限 (デフォルト: 60 秒)
    pub read_timeout: Option<Duration>,
    /// 書き込みが進まないまま待つ上限 (デフォルト: 60 秒)
    pub write_timeout: Option<Duration>,
    /// ブロッキング中にキャンセルを確認する間隔 (デフォルト: 50 ミリ秒)
    pub poll_interval: Duration,
    /// 呼び出し側が指定しなかった場合に送る User-Agent (空なら送らない)
    pub user_agent: String,
    /// 1 回の受信に使うバッファサイズ (デフォルト: 16KB)
    pub read_buffer_size: usize,
    /// リクエストボディ送信に使うバッファサイズ (デフォルト: 64KB)
    pub send_buffer_size: usize,
    /// レスポンスデコーダーの制限
    pub limits: DecoderLimits,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            read_timeout: Some(Duration::from_secs(60)),
            write_timeout: Some(Duration::from_secs(60)),
            poll_interval: Duration::from_millis(50),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            read_buffer_size: 16 * 1024,
            send_buffer_size: 64 * 1024,
            limits: DecoderLimits::default(),
        }
    }
}

/// リクエストを送りレスポンスを受け取るもの
///
/// リトライを行う側はこのトレイト越しに送信する。
pub trait HttpTransport: Send + Sync {
    /// リクエストを送信し、ヘッダーを受信した時点でレスポンスを返す
    ///
    /// リクエストボディは現在位置から読まれる。再送する前に呼び出し側が `rewind()` すること。
    fn send(&self, ctx: &Context, request: &mut Request<'_>) -> Result<RawResponse>;
}

/// ソケットを使う `HttpTransport` 実装
///
/// 1 リクエストごとに接続を開き、レスポンスボディを読み終えたら閉じる。
#[derive(Clone)]
pub struct Transport {
    connector: Arc<dyn Connector>,
    options: TransportOptions,
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Transport {
    /// `TcpConnector` と既定の設定でトランスポートを作成
    pub fn new() -> Self {
        Self {
            connector: Arc::new(TcpConnector::new()),
            options: TransportOptions::default(),
        }
    }

    /// ソケット層を差し替える
    pub fn connector(mut self, connector: impl Connector + 'static) -> Self {
        self.connector = Arc::new(connector);
        self
    }

    /// 設定をまとめて指定
    pub fn options(mut self, options: TransportOptions) -> Self {
        self.options = options;
        self
    }

    /// 接続タイムアウトを設定
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.options.connect_timeout = timeout;
        self
    }

    /// 読み取りタイムアウトを設定
    pub fn read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.options.read_timeout = timeout;
        self
    }

    /// 書き込みタイムアウトを設定
    pub fn write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.options.write_timeout = timeout;
        self
    }

    /// User-Agent を設定
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.options.user_agent = user_agent.into();
        self
    }

    /// TLS 設定を指定 (HTTPS 用)
    ///
    /// ソケット層はこの設定を使う `TcpConnector` に置き換わる。
    pub fn tls_config(self, config: Arc<ClientConfig>) -> Self {
        self.connector(TcpConnector::with_tls_config(config))
    }

    /// 現在の設定
    pub fn transport_options(&self) -> &TransportOptions {
        &self.options
    }
}

impl HttpTransport for Transport {
    fn send(&self, ctx: &Context, request: &mut Request<'_>) -> Result<RawResponse> {
        let span = tracing::debug_span!(
            "send",
            method = %request.method(),
            url = %request.url(),
        );
        let _enter = span.enter();

        ctx.check()?;
        // 接続を開く前にヘッダーとボディ長を検証する
        let head = encode_request_head(request, &self.options.user_agent)?;

        let mut exchange = Exchange::new(
            &self.options,
            request.method() == Method::Head,
            span.clone(),
        );
        let result = exchange_head(&mut exchange, ctx, self.connector.as_ref(), request, &head);
        let (response_head, body_kind) = match result {
            Ok(received) => received,
            Err(e) => {
                exchange.abort(&e);
                return Err(e);
            }
        };

        let headers = Headers::from(response_head.headers);
        let mut response = RawResponse::new(
            response_head.version,
            response_head.status_code,
            response_head.reason_phrase,
            headers,
        );
        response.set_body(Box::new(LiveResponseStream::new(exchange, body_kind)));
        Ok(response)
    }
}

/// 接続からヘッダー受信までを進める
fn exchange_head(
    exchange: &mut Exchange,
    ctx: &Context,
    connector: &dyn Connector,
    request: &mut Request<'_>,
    head: &EncodedHead,
) -> Result<(ResponseHead, BodyKind)> {
    exchange.connect(ctx, connector, request.url())?;
    exchange.send_request(ctx, &head.bytes, request.body_mut(), head.content_length)?;
    exchange.receive_head(ctx)
}
