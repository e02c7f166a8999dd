//! 接続に結び付いたレスポンスボディ

use std::fmt;

use crate::body_stream::BodyStream;
use crate::context::Context;
use crate::decoder::BodyKind;
use crate::error::{Error, Phase, Result};

use super::exchange::{Exchange, TransportState};

/// 開いたままの接続からレスポンスボディを読むストリーム
///
/// 終端まで読むと (`read` が 0 を返した時点で) 接続を解放する。途中で破棄した場合、
/// 読み取りが失敗した場合、キャンセルされた場合も解放する。巻き戻しはできない。
pub struct LiveResponseStream {
    exchange: Exchange,
    body_kind: BodyKind,
}

impl LiveResponseStream {
    pub(crate) fn new(mut exchange: Exchange, body_kind: BodyKind) -> Self {
        exchange.start_streaming();
        Self {
            exchange,
            body_kind,
        }
    }

    /// 現在の状態
    pub fn state(&self) -> TransportState {
        self.exchange.state()
    }

    /// ボディのフレーミング
    pub fn body_kind(&self) -> BodyKind {
        self.body_kind
    }
}

impl BodyStream for LiveResponseStream {
    fn length(&self) -> Option<u64> {
        self.body_kind.declared_length()
    }

    fn rewind(&mut self) -> Result<()> {
        Err(Error::NotSupported(
            "a live response stream is bound to its connection and cannot be rewound; \
             resend the request to read the body again"
                .to_string(),
        ))
    }

    fn on_read(&mut self, ctx: &Context, buf: &mut [u8]) -> Result<usize> {
        match self.exchange.state() {
            TransportState::Closed => return Ok(0),
            TransportState::Aborted => {
                return Err(Error::transport_msg(
                    Phase::Receive,
                    "response stream was aborted by an earlier failure",
                ));
            }
            _ => {}
        }

        let span = self.exchange.span().clone();
        let _enter = span.enter();
        match self.exchange.read_body(ctx, buf) {
            Ok(n) => {
                tracing::trace!(bytes = n, "read response body");
                Ok(n)
            }
            Err(e) => {
                self.exchange.abort(&e);
                Err(e)
            }
        }
    }
}

impl fmt::Debug for LiveResponseStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveResponseStream")
            .field("state", &self.exchange.state())
            .field("body_kind", &self.body_kind)
            .finish()
    }
}
