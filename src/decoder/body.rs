//! ボディデコーダーの定義

use crate::error::ProtocolError;
use crate::limits::DecoderLimits;

use super::phase::DecodePhase;

/// ボディの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    /// Content-Length で指定された固定長
    ContentLength(u64),
    /// Transfer-Encoding: chunked
    Chunked,
    /// 接続が閉じるまでがボディ (close-delimited)
    ///
    /// RFC 9112: レスポンスで Transfer-Encoding も Content-Length もない場合、
    /// 接続が閉じられるまでをボディとして扱う
    CloseDelimited,
    /// ボディなし
    None,
}

impl BodyKind {
    /// 宣言されたボディ長
    ///
    /// chunked と close-delimited は長さ不明なので `None`。
    pub fn declared_length(&self) -> Option<u64> {
        match self {
            BodyKind::ContentLength(len) => Some(*len),
            BodyKind::None => Some(0),
            BodyKind::Chunked | BodyKind::CloseDelimited => None,
        }
    }
}

/// ボディデコードの進捗
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyProgress {
    /// まだデータがある（続きを読む）
    Continue,
    /// 完了（トレーラーがある場合は含む）
    Complete { trailers: Vec<(String, String)> },
}

/// バッファ長と残りバイト数の小さい方
fn available(buf_len: usize, remaining: u64) -> usize {
    usize::try_from(remaining).map_or(buf_len, |r| r.min(buf_len))
}

/// ボディデコーダー (内部用)
#[derive(Debug, Default)]
pub(crate) struct BodyDecoder {
    /// トレーラーヘッダー
    trailers: Vec<(String, String)>,
    /// ボディ内での消費済みバイト数
    body_consumed: u64,
}

impl BodyDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// これまでに消費したボディのバイト数
    pub fn body_consumed(&self) -> u64 {
        self.body_consumed
    }

    /// 利用可能なボディデータを覗く（ゼロコピー）
    pub fn peek_body<'a>(&self, buf: &'a [u8], phase: &DecodePhase) -> Option<&'a [u8]> {
        let n = match phase {
            DecodePhase::BodyContentLength { remaining }
            | DecodePhase::BodyChunkedData { remaining } => available(buf.len(), *remaining),
            DecodePhase::BodyCloseDelimited => buf.len(),
            DecodePhase::BodyChunkedSize
            | DecodePhase::BodyChunkedDataCrlf
            | DecodePhase::ChunkedTrailer
            | DecodePhase::Complete
            | DecodePhase::StartLine
            | DecodePhase::Headers => 0,
        };
        if n == 0 { None } else { Some(&buf[..n]) }
    }

    /// ボディデータを消費
    ///
    /// `len == 0` はデータを消費せずに状態機械だけを進める。
    pub fn consume_body(
        &mut self,
        buf: &mut Vec<u8>,
        phase: &mut DecodePhase,
        len: usize,
        limits: &DecoderLimits,
    ) -> Result<BodyProgress, ProtocolError> {
        match phase {
            DecodePhase::BodyContentLength { remaining } => {
                self.take(buf, remaining, len)?;
                if *remaining == 0 {
                    *phase = DecodePhase::Complete;
                    return Ok(BodyProgress::Complete {
                        trailers: Vec::new(),
                    });
                }
                Ok(BodyProgress::Continue)
            }
            DecodePhase::BodyChunkedSize => {
                self.process_chunked_size(buf, phase, limits)?;
                Ok(self.progress_of(phase))
            }
            DecodePhase::BodyChunkedData { remaining } => {
                self.take(buf, remaining, len)?;
                if *remaining == 0 {
                    // チャンクデータ終了、CRLF 待ちへ遷移
                    *phase = DecodePhase::BodyChunkedDataCrlf;
                    Self::process_chunk_crlf(buf, phase)?;
                    // 続くチャンクサイズ行がバッファにあれば処理する
                    self.process_chunked_size(buf, phase, limits)?;
                }
                Ok(self.progress_of(phase))
            }
            DecodePhase::BodyChunkedDataCrlf => {
                Self::process_chunk_crlf(buf, phase)?;
                self.process_chunked_size(buf, phase, limits)?;
                Ok(self.progress_of(phase))
            }
            DecodePhase::ChunkedTrailer => {
                self.process_trailers(buf, phase, limits)?;
                Ok(self.progress_of(phase))
            }
            DecodePhase::BodyCloseDelimited => {
                // Complete への遷移は mark_eof() で行う
                if len > buf.len() {
                    return Err(ProtocolError::InvalidData(
                        "consume_body: len exceeds buffer".to_string(),
                    ));
                }
                buf.drain(..len);
                self.body_consumed += len as u64;
                Ok(BodyProgress::Continue)
            }
            DecodePhase::Complete => Ok(BodyProgress::Complete {
                trailers: std::mem::take(&mut self.trailers),
            }),
            DecodePhase::StartLine | DecodePhase::Headers => Err(ProtocolError::InvalidData(
                "consume_body called before decode_headers".to_string(),
            )),
        }
    }

    fn progress_of(&mut self, phase: &DecodePhase) -> BodyProgress {
        match phase {
            DecodePhase::Complete => BodyProgress::Complete {
                trailers: std::mem::take(&mut self.trailers),
            },
            _ => BodyProgress::Continue,
        }
    }

    /// 固定長の範囲から `len` バイトを取り除く
    fn take(
        &mut self,
        buf: &mut Vec<u8>,
        remaining: &mut u64,
        len: usize,
    ) -> Result<(), ProtocolError> {
        if len as u64 > *remaining {
            return Err(ProtocolError::InvalidData(
                "consume_body: len exceeds remaining".to_string(),
            ));
        }
        if len > buf.len() {
            return Err(ProtocolError::InvalidData(
                "consume_body: len exceeds buffer".to_string(),
            ));
        }
        buf.drain(..len);
        *remaining -= len as u64;
        self.body_consumed += len as u64;
        Ok(())
    }

    /// チャンクデータ直後の CRLF を処理
    fn process_chunk_crlf(buf: &mut Vec<u8>, phase: &mut DecodePhase) -> Result<(), ProtocolError> {
        if !matches!(phase, DecodePhase::BodyChunkedDataCrlf) || buf.len() < 2 {
            return Ok(());
        }
        if buf[..2] != *b"\r\n" {
            return Err(ProtocolError::InvalidData(
                "invalid chunked encoding: expected CRLF after chunk data".to_string(),
            ));
        }
        buf.drain(..2);
        *phase = DecodePhase::BodyChunkedSize;
        Ok(())
    }

    /// chunked のチャンクサイズ行を処理
    fn process_chunked_size(
        &mut self,
        buf: &mut Vec<u8>,
        phase: &mut DecodePhase,
        limits: &DecoderLimits,
    ) -> Result<(), ProtocolError> {
        if !matches!(phase, DecodePhase::BodyChunkedSize) {
            return Ok(());
        }

        let Some(pos) = find_line(buf) else {
            // 改行が来ないまま長さ制限を超えた場合もエラー
            if buf.len() > limits.max_chunk_line_size {
                return Err(ProtocolError::ChunkLineTooLong {
                    size: buf.len(),
                    limit: limits.max_chunk_line_size,
                });
            }
            return Ok(());
        };
        if pos > limits.max_chunk_line_size {
            return Err(ProtocolError::ChunkLineTooLong {
                size: pos,
                limit: limits.max_chunk_line_size,
            });
        }

        let line = std::str::from_utf8(&buf[..pos])
            .map_err(|e| ProtocolError::InvalidData(format!("invalid UTF-8: {e}")))?;

        // チャンクサイズをパース (拡張は無視)
        let size_str = line.split(';').next().unwrap_or(line).trim();
        let chunk_size = parse_chunk_size(size_str)?;
        buf.drain(..pos + 2);

        if chunk_size == 0 {
            *phase = DecodePhase::ChunkedTrailer;
            self.process_trailers(buf, phase, limits)
        } else {
            *phase = DecodePhase::BodyChunkedData {
                remaining: chunk_size,
            };
            Ok(())
        }
    }

    /// トレーラーヘッダーを処理
    fn process_trailers(
        &mut self,
        buf: &mut Vec<u8>,
        phase: &mut DecodePhase,
        limits: &DecoderLimits,
    ) -> Result<(), ProtocolError> {
        while matches!(phase, DecodePhase::ChunkedTrailer) {
            let Some(pos) = find_line(buf) else {
                return Ok(());
            };
            if pos == 0 {
                buf.drain(..2);
                *phase = DecodePhase::Complete;
                return Ok(());
            }
            if pos > limits.max_header_line_size {
                return Err(ProtocolError::HeaderLineTooLong {
                    size: pos,
                    limit: limits.max_header_line_size,
                });
            }
            if self.trailers.len() >= limits.max_headers_count {
                return Err(ProtocolError::TooManyHeaders {
                    count: self.trailers.len() + 1,
                    limit: limits.max_headers_count,
                });
            }

            let line = std::str::from_utf8(&buf[..pos])
                .map_err(|e| ProtocolError::InvalidData(format!("invalid UTF-8: {e}")))?;
            let (name, value) = parse_header_line(line)?;
            buf.drain(..pos + 2);
            self.trailers.push((name, value));
        }
        Ok(())
    }
}

/// チャンクサイズ (16 進数) をパース
fn parse_chunk_size(s: &str) -> Result<u64, ProtocolError> {
    // from_str_radix は先頭の '+' を受け付けるため自前で検証する
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ProtocolError::InvalidData(format!(
            "invalid chunk size: {s}"
        )));
    }
    u64::from_str_radix(s, 16)
        .map_err(|_| ProtocolError::InvalidData(format!("chunk size overflow: {s}")))
}

/// CRLF で終わる行を探す
pub(crate) fn find_line(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// ヘッダー行をパース
pub(crate) fn parse_header_line(line: &str) -> Result<(String, String), ProtocolError> {
    if line.starts_with(' ') || line.starts_with('\t') {
        return Err(ProtocolError::InvalidData(
            "invalid header line: obs-fold".to_string(),
        ));
    }
    if line.contains('\r') || line.contains('\n') {
        return Err(ProtocolError::InvalidData(
            "invalid header line: contains CR/LF".to_string(),
        ));
    }

    let (name, value) = line.split_once(':').ok_or_else(|| {
        ProtocolError::InvalidData("invalid header line: missing colon".to_string())
    })?;
    if name.is_empty() {
        return Err(ProtocolError::InvalidData(
            "invalid header line: empty name".to_string(),
        ));
    }
    if !is_valid_header_name(name) {
        return Err(ProtocolError::InvalidData(
            "invalid header line: invalid name".to_string(),
        ));
    }

    // ヘッダー値の検証 (RFC 9110 Section 5.5)
    let value = value.trim_matches(|c| c == ' ' || c == '\t');
    if !is_valid_field_value(value) {
        return Err(ProtocolError::InvalidData(
            "invalid header line: invalid value (contains control characters)".to_string(),
        ));
    }

    Ok((name.to_string(), value.to_string()))
}

/// ヘッダー名が有効か確認
pub(crate) fn is_valid_header_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(is_token_char)
}

/// トークン文字か確認
pub(crate) fn is_token_char(b: u8) -> bool {
    matches!(
        b,
        b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' |
        b'0'..=b'9' | b'A'..=b'Z' | b'^' | b'_' | b'`' | b'a'..=b'z' | b'|' | b'~'
    )
}

/// ヘッダー値に許可される文字か確認 (RFC 9110 Section 5.5)
///
/// field-vchar = VCHAR / obs-text。SP と HTAB も許可される。
pub(crate) fn is_valid_field_vchar(b: u8) -> bool {
    matches!(b, 0x09 | 0x20..=0x7E | 0x80..=0xFF)
}

/// ヘッダー値が有効か確認 (RFC 9110 Section 5.5)
///
/// 制御文字 (0x00-0x08, 0x0A-0x1F, 0x7F) を含む場合は無効
pub(crate) fn is_valid_field_value(value: &str) -> bool {
    value.bytes().all(is_valid_field_vchar)
}

/// Transfer-Encoding ヘッダーを解析
///
/// RFC 9112: chunked は一度だけ指定可能で、最後のエンコーディングでなければならない。
/// 複数の Transfer-Encoding ヘッダーは連結して単一のリストとして扱う。
/// chunked より前のコーディング (gzip など) は解除せず、ボディにそのまま残す。
pub(crate) fn parse_transfer_encoding_chunked(
    headers: &[(String, String)],
) -> Result<bool, ProtocolError> {
    let mut codings = Vec::new();
    for (name, value) in headers {
        if !name.eq_ignore_ascii_case("Transfer-Encoding") {
            continue;
        }
        for token in value.split(',') {
            let token = token.trim();
            if token.is_empty() || !token.bytes().all(is_token_char) {
                return Err(ProtocolError::InvalidData(format!(
                    "invalid Transfer-Encoding: bad token {token:?}"
                )));
            }
            codings.push(token);
        }
    }

    let Some((last, rest)) = codings.split_last() else {
        return Ok(false);
    };
    if rest.iter().any(|c| c.eq_ignore_ascii_case("chunked")) {
        return Err(ProtocolError::InvalidData(
            "invalid Transfer-Encoding: chunked must be applied once and last".to_string(),
        ));
    }
    if !last.eq_ignore_ascii_case("chunked") {
        // 最後が chunked でなければボディの終端を判定できない
        return Err(ProtocolError::InvalidData(format!(
            "invalid Transfer-Encoding: unsupported final coding {last:?}"
        )));
    }
    Ok(true)
}

/// Content-Length ヘッダーを解析
///
/// 複数ある場合はすべて同じ値でなければならない。
pub(crate) fn parse_content_length(
    headers: &[(String, String)],
) -> Result<Option<u64>, ProtocolError> {
    let mut value: Option<u64> = None;
    for (name, raw_value) in headers {
        if !name.eq_ignore_ascii_case("Content-Length") {
            continue;
        }
        // "5, 5" のようにリストで送られる場合もある
        for item in raw_value.split(',') {
            let parsed = parse_content_length_value(item).ok_or_else(|| {
                ProtocolError::InvalidData(format!("invalid Content-Length: {raw_value:?}"))
            })?;
            match value {
                Some(prev) if prev != parsed => {
                    return Err(ProtocolError::InvalidData(
                        "invalid Content-Length: mismatched values".to_string(),
                    ));
                }
                _ => value = Some(parsed),
            }
        }
    }
    Ok(value)
}

/// Content-Length 値をパース
///
/// 数字以外 (符号・空白・小数点) を含む値は受け付けない。
pub(crate) fn parse_content_length_value(input: &str) -> Option<u64> {
    let input = input.trim();
    if input.is_empty() || !input.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    input.parse::<u64>().ok()
}

/// ボディ関連ヘッダーを解決
pub(crate) fn resolve_body_headers(
    headers: &[(String, String)],
) -> Result<(bool, Option<u64>), ProtocolError> {
    let transfer_encoding_chunked = parse_transfer_encoding_chunked(headers)?;
    let content_length = parse_content_length(headers)?;

    if transfer_encoding_chunked && content_length.is_some() {
        return Err(ProtocolError::InvalidData(
            "invalid message: both Transfer-Encoding and Content-Length".to_string(),
        ));
    }

    Ok((transfer_encoding_chunked, content_length))
}
