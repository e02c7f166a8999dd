//! リクエストヘッダーのエンコード

use url::{Position, Url};

use crate::decoder::parse_content_length_value;
use crate::error::{Error, Result};
use crate::headers::validate_header;
use crate::request::Request;

/// エンコード済みのリクエストヘッダーと送信するボディ長
#[derive(Debug)]
pub(crate) struct EncodedHead {
    pub bytes: Vec<u8>,
    pub content_length: u64,
}

/// リクエスト行とヘッダーをエンコードする
///
/// 接続を開く前に呼び、ヘッダーの検証とボディ長の決定をここで済ませる。
/// `Host` `User-Agent` `Connection: close` は呼び出し側が設定していなければ追加する。
pub(crate) fn encode_request_head(request: &Request<'_>, user_agent: &str) -> Result<EncodedHead> {
    let headers = request.headers();
    for (name, value) in headers.iter() {
        validate_header(name, value)?;
    }
    if headers.contains("Transfer-Encoding") {
        return Err(Error::invalid_header(
            "Transfer-Encoding",
            "request bodies are sent with Content-Length only",
        ));
    }

    let content_length = request.body_length().ok_or_else(|| {
        Error::NotSupported(
            "request body with unknown length cannot be sent, Content-Length is required"
                .to_string(),
        )
    })?;
    let send_content_length = request.has_body() || request.method().expects_body();
    if let Some(value) = headers.get("Content-Length") {
        if parse_content_length_value(value) != Some(content_length) {
            return Err(Error::invalid_header(
                "Content-Length",
                &format!("header value {value:?} does not match body length {content_length}"),
            ));
        }
    }

    let url = request.url();
    let mut buf = Vec::with_capacity(256);
    buf.extend_from_slice(request.method().as_str().as_bytes());
    buf.push(b' ');
    buf.extend_from_slice(origin_form(url).as_bytes());
    buf.extend_from_slice(b" HTTP/1.1\r\n");

    if !headers.contains("Host") {
        push_header(&mut buf, "Host", &host_header(url)?);
    }
    if !headers.contains("User-Agent") && !user_agent.is_empty() {
        validate_header("User-Agent", user_agent)?;
        push_header(&mut buf, "User-Agent", user_agent);
    }
    if !headers.contains("Connection") {
        push_header(&mut buf, "Connection", "close");
    }
    for (name, value) in headers.iter() {
        if name.eq_ignore_ascii_case("Content-Length") {
            continue;
        }
        push_header(&mut buf, name, value);
    }
    if send_content_length {
        push_header(&mut buf, "Content-Length", &content_length.to_string());
    }
    buf.extend_from_slice(b"\r\n");

    Ok(EncodedHead {
        bytes: buf,
        content_length,
    })
}

fn push_header(buf: &mut Vec<u8>, name: &str, value: &str) {
    buf.extend_from_slice(name.as_bytes());
    buf.extend_from_slice(b": ");
    buf.extend_from_slice(value.as_bytes());
    buf.extend_from_slice(b"\r\n");
}

/// origin-form (absolute-path [ "?" query ])
fn origin_form(url: &Url) -> &str {
    let target = &url[Position::BeforePath..Position::AfterQuery];
    if target.is_empty() { "/" } else { target }
}

/// Host ヘッダーの値 (既定ポート以外ならポート付き)
fn host_header(url: &Url) -> Result<String> {
    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| Error::InvalidUrl(format!("{url}: missing host")))?;
    Ok(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}
