//! HTTP リクエスト

use std::fmt;

use url::Url;

use crate::body_stream::BodyStream;
use crate::error::{Error, Result};
use crate::headers::Headers;

/// HTTP メソッド
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Patch,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
        }
    }

    /// ボディなしでも `Content-Length: 0` を送るメソッドか
    pub(crate) fn expects_body(&self) -> bool {
        matches!(self, Method::Post | Method::Put | Method::Patch)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "GET" => Ok(Method::Get),
            "HEAD" => Ok(Method::Head),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            "PATCH" => Ok(Method::Patch),
            _ => Err(Error::NotSupported(format!("unsupported HTTP method: {s}"))),
        }
    }
}

/// 送信するリクエスト
///
/// ボディは呼び出し側が所有するストリームを借用する。リトライする場合は
/// `body_mut()` で取り出したストリームを `rewind()` してから再送する。
pub struct Request<'a> {
    method: Method,
    url: Url,
    headers: Headers,
    body: Option<&'a mut (dyn BodyStream + 'a)>,
}

impl<'a> Request<'a> {
    /// 新しいリクエストを作成
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Headers::new(),
            body: None,
        }
    }

    /// URL 文字列をパースしてリクエストを作成
    ///
    /// スキームは `http` と `https` のみ受け付ける。
    pub fn parse(method: Method, url: &str) -> Result<Self> {
        let url = Url::parse(url).map_err(|e| Error::InvalidUrl(format!("{url}: {e}")))?;
        Ok(Self::new(method, url))
    }

    /// ヘッダーを追加 (ビルダーパターン)
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.append(name, value);
        self
    }

    /// ボディを設定 (ビルダーパターン)
    pub fn body(mut self, body: &'a mut (dyn BodyStream + 'a)) -> Self {
        self.body = Some(body);
        self
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    /// ボディストリームを取得
    pub fn body_mut(&mut self) -> Option<&mut (dyn BodyStream + 'a)> {
        self.body.as_deref_mut()
    }

    /// ボディの宣言された長さ
    ///
    /// ボディがなければ `Some(0)`。
    pub fn body_length(&self) -> Option<u64> {
        self.body.as_ref().map_or(Some(0), |body| body.length())
    }

    pub(crate) fn has_body(&self) -> bool {
        self.body.is_some()
    }
}

impl fmt::Debug for Request<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("url", &self.url.as_str())
            .field("headers", &self.headers)
            .field("body_length", &self.body_length())
            .finish()
    }
}
