//! HTTP レスポンスデコーダー

use crate::error::ProtocolError;
use crate::limits::DecoderLimits;

use super::body::{
    BodyDecoder, BodyKind, BodyProgress, find_line, parse_header_line, resolve_body_headers,
};
use super::head::{ResponseHead, StatusLine, parse_status_line};
use super::phase::DecodePhase;

/// HTTP レスポンスデコーダー (Sans I/O)
///
/// 受信したバイト列を `feed()` で渡し、`decode_headers()` でステータス行とヘッダーを、
/// `peek_body()` / `consume_body()` / `progress()` でボディを逐次取り出す。
///
/// 101 以外の 1xx 中間レスポンスは読み飛ばし、最終レスポンスのヘッダーだけを返す。
#[derive(Debug)]
pub struct ResponseDecoder {
    buf: Vec<u8>,
    phase: DecodePhase,
    status_line: Option<StatusLine>,
    headers: Vec<(String, String)>,
    body_decoder: BodyDecoder,
    limits: DecoderLimits,
    /// HEAD リクエストへのレスポンスかどうか
    expect_no_body: bool,
    /// ヘッダーデコード後のボディ種別
    body_kind: Option<BodyKind>,
    /// 読み飛ばした中間レスポンスの数
    interim_responses: usize,
}

impl Default for ResponseDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseDecoder {
    /// 新しいデコーダーを作成
    pub fn new() -> Self {
        Self::with_limits(DecoderLimits::default())
    }

    /// 制限付きでデコーダーを作成
    pub fn with_limits(limits: DecoderLimits) -> Self {
        Self {
            buf: Vec::new(),
            phase: DecodePhase::StartLine,
            status_line: None,
            headers: Vec::new(),
            body_decoder: BodyDecoder::new(),
            limits,
            expect_no_body: false,
            body_kind: None,
            interim_responses: 0,
        }
    }

    /// HEAD リクエストへのレスポンスとしてデコード (ボディなし)
    pub fn set_expect_no_body(&mut self, expect_no_body: bool) {
        self.expect_no_body = expect_no_body;
    }

    /// 制限設定を取得
    pub fn limits(&self) -> &DecoderLimits {
        &self.limits
    }

    /// バッファにデータを追加
    pub fn feed(&mut self, data: &[u8]) -> Result<(), ProtocolError> {
        let new_size = self.buf.len() + data.len();
        if new_size > self.limits.max_buffer_size {
            return Err(ProtocolError::BufferOverflow {
                size: new_size,
                limit: self.limits.max_buffer_size,
            });
        }
        self.buf.extend_from_slice(data);
        Ok(())
    }

    /// `feed()` で追加できる残りバイト数
    pub fn free_capacity(&self) -> usize {
        self.limits.max_buffer_size.saturating_sub(self.buf.len())
    }

    /// バッファの残りデータを取得
    pub fn remaining(&self) -> &[u8] {
        &self.buf
    }

    /// ヘッダーデコード後のボディ種別
    pub fn body_kind(&self) -> Option<BodyKind> {
        self.body_kind
    }

    /// これまでに消費したボディのバイト数
    pub fn body_consumed(&self) -> u64 {
        self.body_decoder.body_consumed()
    }

    /// 読み飛ばした 1xx 中間レスポンスの数
    pub fn interim_responses(&self) -> usize {
        self.interim_responses
    }

    /// 接続終了を通知 (close-delimited ボディ用)
    ///
    /// close-delimited ボディを読み取り中で、バッファのボディを消費し終えていれば
    /// Complete に遷移する。それ以外の状態では何もしない。
    pub fn mark_eof(&mut self) {
        if matches!(self.phase, DecodePhase::BodyCloseDelimited) && self.buf.is_empty() {
            self.phase = DecodePhase::Complete;
        }
    }

    /// close-delimited ボディを読み取り中かどうかを判定
    pub fn is_close_delimited(&self) -> bool {
        matches!(self.phase, DecodePhase::BodyCloseDelimited)
    }

    /// ヘッダーの読み取りが終わっているか
    pub fn headers_done(&self) -> bool {
        !matches!(self.phase, DecodePhase::StartLine | DecodePhase::Headers)
    }

    /// ボディまで読み終えたか
    pub fn is_complete(&self) -> bool {
        matches!(self.phase, DecodePhase::Complete)
    }

    /// ステータスコードからボディがあるかどうかを判定
    fn status_has_body(status_code: u16) -> bool {
        // 1xx, 204, 304 はボディなし
        !((100..200).contains(&status_code) || status_code == 204 || status_code == 304)
    }

    /// ボディモードを決定
    ///
    /// RFC 9112 Section 6.3 の優先順位に従う:
    /// 1. HEAD レスポンス、1xx/204/304 はボディなし
    /// 2. Transfer-Encoding がある場合は chunked
    /// 3. Content-Length がある場合は固定長
    /// 4. それ以外は close-delimited (接続が閉じるまでがボディ)
    fn determine_body_kind(&self, status_code: u16) -> Result<BodyKind, ProtocolError> {
        let (transfer_encoding_chunked, content_length) = resolve_body_headers(&self.headers)?;

        if self.expect_no_body || !Self::status_has_body(status_code) {
            return Ok(BodyKind::None);
        }
        if transfer_encoding_chunked {
            return Ok(BodyKind::Chunked);
        }
        if let Some(len) = content_length {
            return Ok(BodyKind::ContentLength(len));
        }
        Ok(BodyKind::CloseDelimited)
    }

    /// ヘッダー行の制限を確認して 1 行取り出す
    fn take_line(&mut self, limit: usize) -> Result<Option<String>, ProtocolError> {
        let Some(pos) = find_line(&self.buf) else {
            // 改行が来ないまま行長制限を超えたらエラー
            if self.buf.len() > limit {
                return Err(ProtocolError::HeaderLineTooLong {
                    size: self.buf.len(),
                    limit,
                });
            }
            return Ok(None);
        };
        if pos > limit {
            return Err(ProtocolError::HeaderLineTooLong { size: pos, limit });
        }
        let line = String::from_utf8(self.buf[..pos].to_vec())
            .map_err(|e| ProtocolError::InvalidData(format!("invalid UTF-8: {e}")))?;
        self.buf.drain(..pos + 2);
        Ok(Some(line))
    }

    /// ヘッダーをデコード
    ///
    /// 最終レスポンスのヘッダーが揃ったら `Some((ResponseHead, BodyKind))` を返す。
    /// データ不足の場合は `None` を返す。
    pub fn decode_headers(&mut self) -> Result<Option<(ResponseHead, BodyKind)>, ProtocolError> {
        loop {
            match &self.phase {
                DecodePhase::StartLine => {
                    let Some(line) = self.take_line(self.limits.max_header_line_size)? else {
                        return Ok(None);
                    };
                    self.status_line = Some(parse_status_line(&line)?);
                    self.phase = DecodePhase::Headers;
                }
                DecodePhase::Headers => {
                    let Some(line) = self.take_line(self.limits.max_header_line_size)? else {
                        return Ok(None);
                    };
                    if !line.is_empty() {
                        if self.headers.len() >= self.limits.max_headers_count {
                            return Err(ProtocolError::TooManyHeaders {
                                count: self.headers.len() + 1,
                                limit: self.limits.max_headers_count,
                            });
                        }
                        let (name, value) = parse_header_line(&line)?;
                        self.headers.push((name, value));
                        continue;
                    }

                    // 空行: ヘッダー終了
                    let status_line = self.status_line.take().ok_or_else(|| {
                        ProtocolError::InvalidData("missing status line".to_string())
                    })?;
                    let status_code = status_line.status_code;

                    if (100..200).contains(&status_code) && status_code != 101 {
                        // 中間レスポンスは読み飛ばして最終レスポンスを待つ
                        self.headers.clear();
                        self.interim_responses += 1;
                        self.phase = DecodePhase::StartLine;
                        continue;
                    }

                    let body_kind = self.determine_body_kind(status_code)?;
                    self.phase = match body_kind {
                        BodyKind::ContentLength(0) | BodyKind::None => DecodePhase::Complete,
                        BodyKind::ContentLength(len) => {
                            DecodePhase::BodyContentLength { remaining: len }
                        }
                        BodyKind::Chunked => DecodePhase::BodyChunkedSize,
                        BodyKind::CloseDelimited => DecodePhase::BodyCloseDelimited,
                    };
                    self.body_kind = Some(body_kind);

                    let head = ResponseHead {
                        version: status_line.version,
                        status_code,
                        reason_phrase: status_line.reason_phrase,
                        headers: std::mem::take(&mut self.headers),
                    };
                    return Ok(Some((head, body_kind)));
                }
                _ => {
                    return Err(ProtocolError::InvalidData(
                        "decode_headers called after headers were decoded".to_string(),
                    ));
                }
            }
        }
    }

    /// 利用可能なボディデータを覗く（ゼロコピー）
    ///
    /// `decode_headers()` 成功後に呼ぶ。ボディがない場合や完了済みの場合は `None` を返す。
    pub fn peek_body(&self) -> Option<&[u8]> {
        self.body_decoder.peek_body(&self.buf, &self.phase)
    }

    /// ボディデータを消費
    ///
    /// `peek_body()` で取得したデータを処理した後に呼ぶ。`len` は 1 以上。
    pub fn consume_body(&mut self, len: usize) -> Result<BodyProgress, ProtocolError> {
        if len == 0 {
            return Err(ProtocolError::InvalidData(
                "consume_body(0) is not allowed, use progress() instead".to_string(),
            ));
        }
        self.body_decoder
            .consume_body(&mut self.buf, &mut self.phase, len, &self.limits)
    }

    /// 状態機械を進める (ボディデータは消費しない)
    ///
    /// chunked の場合、チャンクサイズ行のパースや終端チャンクの処理を行う。
    pub fn progress(&mut self) -> Result<BodyProgress, ProtocolError> {
        self.body_decoder
            .consume_body(&mut self.buf, &mut self.phase, 0, &self.limits)
    }
}
