//! 1 回のリクエスト/レスポンスの状態機械とハンドル管理

use std::fmt;
use std::io;
use std::time::{Duration, Instant};

use tracing::Span;
use url::Url;

use crate::body_stream::BodyStream;
use crate::context::Context;
use crate::decoder::{BodyKind, BodyProgress, ResponseDecoder, ResponseHead};
use crate::error::{Error, Phase, Result};

use super::TransportOptions;
use super::connector::{Connection, Connector, Session};

/// トランスポートの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportState {
    Idle,
    Connecting,
    Sending,
    AwaitingResponse,
    HeadersReceived,
    StreamingBody,
    /// ボディを最後まで読み、ハンドルを解放した
    Closed,
    /// 失敗・キャンセル・途中破棄でハンドルを解放した
    Aborted,
}

impl TransportState {
    /// ハンドルを解放済みか
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransportState::Closed | TransportState::Aborted)
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// リクエストハンドル (接続に結び付いた送受信の状態)
struct RequestHandle {
    decoder: ResponseDecoder,
    read_buf: Vec<u8>,
    bytes_sent: u64,
    bytes_received: u64,
}

/// 取得したハンドル
///
/// 取得と逆の順序 (リクエスト、接続、セッション) で一度だけ解放する。
/// 途中までしか取得していなくても、取得済みのものはすべて解放する。
#[derive(Default)]
pub(crate) struct Handles {
    session: Option<Box<dyn Session>>,
    connection: Option<Box<dyn Connection>>,
    request: Option<RequestHandle>,
}

impl Handles {
    pub(crate) fn release(&mut self) {
        if let Some(request) = self.request.take() {
            tracing::trace!(
                bytes_sent = request.bytes_sent,
                bytes_received = request.bytes_received,
                "request handle released"
            );
        }
        if let Some(mut connection) = self.connection.take() {
            match connection.close() {
                Ok(()) => tracing::trace!("connection released"),
                Err(e) => tracing::warn!(error = %e, "failed to close connection"),
            }
        }
        if let Some(mut session) = self.session.take() {
            match session.close() {
                Ok(()) => tracing::trace!("session released"),
                Err(e) => tracing::warn!(error = %e, "failed to close session"),
            }
        }
    }
}

impl Drop for Handles {
    fn drop(&mut self) {
        self.release();
    }
}

/// 1 回分の送受信
pub(crate) struct Exchange {
    state: TransportState,
    handles: Handles,
    connect_timeout: Duration,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
    poll_interval: Duration,
    read_buffer_size: usize,
    send_buffer_size: usize,
    decoder: Option<ResponseDecoder>,
    span: Span,
}

impl Exchange {
    pub(crate) fn new(options: &TransportOptions, expect_no_body: bool, span: Span) -> Self {
        let mut decoder = ResponseDecoder::with_limits(options.limits.clone());
        decoder.set_expect_no_body(expect_no_body);
        Self {
            state: TransportState::Idle,
            handles: Handles::default(),
            connect_timeout: options.connect_timeout,
            read_timeout: options.read_timeout,
            write_timeout: options.write_timeout,
            poll_interval: options.poll_interval.max(Duration::from_millis(1)),
            read_buffer_size: options.read_buffer_size.max(1),
            send_buffer_size: options.send_buffer_size.max(1),
            decoder: Some(decoder),
            span,
        }
    }

    pub(crate) fn state(&self) -> TransportState {
        self.state
    }

    pub(crate) fn span(&self) -> &Span {
        &self.span
    }

    fn transition(&mut self, next: TransportState) {
        tracing::debug!(from = %self.state, to = %next, "transport state");
        self.state = next;
    }

    /// 失敗時の後始末
    ///
    /// 取得済みのハンドルを解放して `Aborted` に遷移する。何度呼んでもよい。
    pub(crate) fn abort(&mut self, reason: &dyn fmt::Display) {
        if self.state.is_terminal() {
            return;
        }
        tracing::debug!(state = %self.state, %reason, "aborting exchange");
        self.handles.release();
        self.transition(TransportState::Aborted);
    }

    /// ボディを最後まで読んだ後の後始末
    fn close(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.handles.release();
        self.transition(TransportState::Closed);
    }

    /// セッションと接続を開く
    pub(crate) fn connect(
        &mut self,
        ctx: &Context,
        connector: &dyn Connector,
        url: &Url,
    ) -> Result<()> {
        self.transition(TransportState::Connecting);
        ctx.check()?;

        let session = self.handles.session.insert(connector.open_session(ctx, url)?);
        tracing::trace!("session opened");
        ctx.check()?;

        let connection = session.connect(ctx, self.connect_timeout)?;
        self.handles.connection = Some(connection);
        tracing::trace!("connection opened");
        ctx.check()?;

        let decoder = self.decoder.take().unwrap_or_default();
        self.handles.request = Some(RequestHandle {
            decoder,
            read_buf: vec![0u8; self.read_buffer_size],
            bytes_sent: 0,
            bytes_received: 0,
        });
        Ok(())
    }

    /// リクエストヘッダーとボディを送信する
    pub(crate) fn send_request(
        &mut self,
        ctx: &Context,
        head: &[u8],
        body: Option<&mut (dyn BodyStream + '_)>,
        content_length: u64,
    ) -> Result<()> {
        self.transition(TransportState::Sending);
        self.write_all(ctx, head)?;

        if let Some(body) = body {
            let capacity = usize::try_from(content_length)
                .map_or(self.send_buffer_size, |len| len.min(self.send_buffer_size))
                .max(1);
            let mut buf = vec![0u8; capacity];
            let mut sent = 0u64;
            while sent < content_length {
                let want = usize::try_from(content_length - sent)
                    .map_or(buf.len(), |r| r.min(buf.len()));
                let n = body.read(ctx, &mut buf[..want])?;
                if n == 0 {
                    return Err(Error::transport_msg(
                        Phase::Send,
                        format!(
                            "request body ended after {sent} of {content_length} declared bytes"
                        ),
                    ));
                }
                self.write_all(ctx, &buf[..n])?;
                sent += n as u64;
            }
        }

        let connection = self.connection(Phase::Send)?;
        connection
            .flush()
            .map_err(|e| Error::transport(Phase::Send, "failed to flush request", e))?;
        Ok(())
    }

    fn connection(&mut self, phase: Phase) -> Result<&mut Box<dyn Connection>> {
        self.handles
            .connection
            .as_mut()
            .ok_or_else(|| Error::transport_msg(phase, "connection is not open"))
    }

    /// 期限とキャンセルを確認しながらすべて書き込む
    fn write_all(&mut self, ctx: &Context, mut data: &[u8]) -> Result<()> {
        let poll_interval = self.poll_interval;
        let write_timeout = self.write_timeout;
        let Handles {
            connection: Some(connection),
            request: Some(request),
            ..
        } = &mut self.handles
        else {
            return Err(Error::transport_msg(Phase::Send, "connection is not open"));
        };

        let mut last_progress = Instant::now();
        while !data.is_empty() {
            ctx.check()?;
            connection
                .set_write_timeout(Some(ctx.bound(poll_interval)))
                .map_err(|e| Error::transport(Phase::Send, "failed to set write timeout", e))?;
            match connection.write(data) {
                Ok(0) => {
                    return Err(Error::transport(
                        Phase::Send,
                        "connection closed while sending",
                        io::ErrorKind::WriteZero.into(),
                    ));
                }
                Ok(n) => {
                    data = &data[n..];
                    request.bytes_sent += n as u64;
                    last_progress = Instant::now();
                }
                Err(e) if is_timeout(&e) => {
                    if write_timeout.is_some_and(|limit| last_progress.elapsed() >= limit) {
                        return Err(Error::transport(Phase::Send, "write timed out", e));
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(Error::transport(Phase::Send, "failed to send", e)),
            }
        }
        Ok(())
    }

    /// 接続からデータを読み、デコーダーに渡す
    ///
    /// 接続が閉じられていれば `true` を返す。データが届くまで `poll_interval` ごとに
    /// `ctx` を確認する。
    fn fill(&mut self, ctx: &Context, phase: Phase) -> Result<bool> {
        let poll_interval = self.poll_interval;
        let read_timeout = self.read_timeout;
        let Handles {
            connection: Some(connection),
            request: Some(request),
            ..
        } = &mut self.handles
        else {
            return Err(Error::transport_msg(phase, "connection is not open"));
        };

        // バッファ上限に達している場合でも 1 バイト読み、feed() で上限超過を検出させる
        let want = request
            .decoder
            .free_capacity()
            .clamp(1, request.read_buf.len());
        let started = Instant::now();
        loop {
            ctx.check()?;
            connection
                .set_read_timeout(Some(ctx.bound(poll_interval)))
                .map_err(|e| Error::transport(phase, "failed to set read timeout", e))?;
            match connection.read(&mut request.read_buf[..want]) {
                Ok(0) => return Ok(true),
                Ok(n) => {
                    request.decoder.feed(&request.read_buf[..n])?;
                    request.bytes_received += n as u64;
                    return Ok(false);
                }
                Err(e) if is_timeout(&e) => {
                    if read_timeout.is_some_and(|limit| started.elapsed() >= limit) {
                        return Err(Error::transport(phase, "timed out waiting for data", e));
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                // TLS で close_notify なしに閉じられた場合
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(true),
                Err(e) => return Err(Error::transport(phase, "failed to receive", e)),
            }
        }
    }

    fn decoder(&mut self, phase: Phase) -> Result<&mut ResponseDecoder> {
        self.handles
            .request
            .as_mut()
            .map(|request| &mut request.decoder)
            .ok_or_else(|| Error::transport_msg(phase, "request handle is not open"))
    }

    /// 最終レスポンスのステータス行とヘッダーを受信する
    pub(crate) fn receive_head(&mut self, ctx: &Context) -> Result<(ResponseHead, BodyKind)> {
        self.transition(TransportState::AwaitingResponse);
        loop {
            if let Some((head, kind)) = self.decoder(Phase::Receive)?.decode_headers()? {
                self.transition(TransportState::HeadersReceived);
                tracing::debug!(
                    status = head.status_code,
                    version = %head.version,
                    body = ?kind,
                    "response headers received"
                );
                return Ok((head, kind));
            }
            if self.fill(ctx, Phase::Receive)? {
                return Err(Error::transport_msg(
                    Phase::Receive,
                    "connection closed before response headers were received",
                ));
            }
        }
    }

    /// ボディをストリームとして渡す段階に入る
    pub(crate) fn start_streaming(&mut self) {
        self.transition(TransportState::StreamingBody);
    }

    /// `buf` が埋まるか、ボディが終わるまで読む
    ///
    /// 反復ごとに `ctx` を確認する。終端に達して 1 バイトも読めなかった呼び出しで
    /// ハンドルを解放し `Closed` に遷移する。
    pub(crate) fn read_body(&mut self, ctx: &Context, buf: &mut [u8]) -> Result<usize> {
        let mut total = 0;
        while total < buf.len() {
            ctx.check()?;
            let decoder = self.decoder(Phase::Receive)?;
            if let Some(data) = decoder.peek_body() {
                let n = data.len().min(buf.len() - total);
                buf[total..total + n].copy_from_slice(&data[..n]);
                decoder.consume_body(n)?;
                total += n;
                continue;
            }
            if let BodyProgress::Complete { .. } = decoder.progress()? {
                break;
            }
            if decoder.peek_body().is_some() {
                continue;
            }
            if self.fill(ctx, Phase::Receive)? {
                let decoder = self.decoder(Phase::Receive)?;
                decoder.mark_eof();
                if decoder.is_complete() {
                    break;
                }
                let received = decoder.body_consumed();
                return Err(Error::transport_msg(
                    Phase::Receive,
                    format!("connection closed after {received} bytes of response body"),
                ));
            }
        }

        if total == 0 && self.decoder(Phase::Receive)?.is_complete() {
            tracing::debug!("response body complete");
            self.close();
        }
        Ok(total)
    }
}

impl Drop for Exchange {
    fn drop(&mut self) {
        if !self.state.is_terminal() {
            let span = self.span.clone();
            let _enter = span.enter();
            self.abort(&"dropped before the response body was fully read");
        }
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    type Log = Arc<Mutex<Vec<&'static str>>>;

    struct LoggedSession(Log);

    impl Session for LoggedSession {
        fn connect(&mut self, _ctx: &Context, _timeout: Duration) -> Result<Box<dyn Connection>> {
            Ok(Box::new(LoggedConnection(self.0.clone())))
        }

        fn close(&mut self) -> io::Result<()> {
            self.0.lock().unwrap().push("session");
            Ok(())
        }
    }

    struct LoggedConnection(Log);

    impl io::Read for LoggedConnection {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Ok(0)
        }
    }

    impl io::Write for LoggedConnection {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Connection for LoggedConnection {
        fn set_read_timeout(&mut self, _timeout: Option<Duration>) -> io::Result<()> {
            Ok(())
        }

        fn set_write_timeout(&mut self, _timeout: Option<Duration>) -> io::Result<()> {
            Ok(())
        }

        fn close(&mut self) -> io::Result<()> {
            self.0.lock().unwrap().push("connection");
            Err(io::Error::other("close failure is only logged"))
        }
    }

    #[test]
    fn release_in_reverse_order_once() {
        let log = Log::default();
        let mut handles = Handles {
            session: Some(Box::new(LoggedSession(log.clone()))),
            connection: Some(Box::new(LoggedConnection(log.clone()))),
            request: None,
        };
        handles.release();
        handles.release();
        drop(handles);
        assert_eq!(*log.lock().unwrap(), vec!["connection", "session"]);
    }

    #[test]
    fn partial_handles_are_released() {
        let log = Log::default();
        let handles = Handles {
            session: Some(Box::new(LoggedSession(log.clone()))),
            connection: None,
            request: None,
        };
        drop(handles);
        assert_eq!(*log.lock().unwrap(), vec!["session"]);
    }

    #[test]
    fn dropped_exchange_is_aborted() {
        let log = Log::default();
        let mut exchange = Exchange::new(&TransportOptions::default(), false, Span::none());
        exchange.handles.session = Some(Box::new(LoggedSession(log.clone())));
        exchange.transition(TransportState::Connecting);
        exchange.abort(&"test");
        assert_eq!(exchange.state(), TransportState::Aborted);
        exchange.abort(&"again");
        drop(exchange);
        assert_eq!(*log.lock().unwrap(), vec!["session"]);
    }

    #[test]
    fn terminal_states() {
        assert!(TransportState::Closed.is_terminal());
        assert!(TransportState::Aborted.is_terminal());
        assert!(!TransportState::StreamingBody.is_terminal());
        assert_eq!(TransportState::AwaitingResponse.to_string(), "AwaitingResponse");
    }
}
