//! HTTP レスポンス

use std::fmt;

use crate::body_stream::{BodyStream, NullBodyStream};
use crate::decoder::{HttpVersion, parse_content_length_value};
use crate::headers::Headers;

/// トランスポートが返すレスポンス
///
/// ボディは通常、接続に結び付いたままの `LiveResponseStream`。
/// ボディを読み終えるか、このレスポンスを破棄すると接続が解放される。
pub struct RawResponse {
    version: HttpVersion,
    status_code: u16,
    reason_phrase: String,
    headers: Headers,
    body: Box<dyn BodyStream + Send>,
}

impl RawResponse {
    /// ボディなしのレスポンスを作成
    pub fn new(
        version: HttpVersion,
        status_code: u16,
        reason_phrase: impl Into<String>,
        headers: Headers,
    ) -> Self {
        Self {
            version,
            status_code,
            reason_phrase: reason_phrase.into(),
            headers,
            body: Box::new(NullBodyStream),
        }
    }

    pub fn version(&self) -> HttpVersion {
        self.version
    }

    pub fn major_version(&self) -> u8 {
        self.version.major
    }

    pub fn minor_version(&self) -> u8 {
        self.version.minor
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn reason_phrase(&self) -> &str {
        &self.reason_phrase
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// ヘッダーを取得 (大文字小文字を区別しない)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Content-Length ヘッダーの値
    pub fn content_length(&self) -> Option<u64> {
        self.headers
            .get("Content-Length")
            .and_then(parse_content_length_value)
    }

    /// ステータスコードが情報レスポンス (1xx) か確認
    pub fn is_informational(&self) -> bool {
        (100..200).contains(&self.status_code)
    }

    /// ステータスコードが成功 (2xx) か確認
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// ステータスコードがリダイレクト (3xx) か確認
    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status_code)
    }

    /// ステータスコードがクライアントエラー (4xx) か確認
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code)
    }

    /// ステータスコードがサーバーエラー (5xx) か確認
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status_code)
    }

    /// ボディストリーム
    pub fn body_mut(&mut self) -> &mut (dyn BodyStream + Send) {
        self.body.as_mut()
    }

    /// ボディストリームを取り出す
    pub fn into_body(self) -> Box<dyn BodyStream + Send> {
        self.body
    }

    /// ボディストリームを差し替える
    ///
    /// 元のボディは破棄される (ライブストリームなら接続が解放される)。
    pub fn set_body(&mut self, body: Box<dyn BodyStream + Send>) {
        self.body = body;
    }
}

impl fmt::Debug for RawResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawResponse")
            .field("version", &self.version)
            .field("status_code", &self.status_code)
            .field("reason_phrase", &self.reason_phrase)
            .field("headers", &self.headers)
            .field("body_length", &self.body.length())
            .finish()
    }
}
