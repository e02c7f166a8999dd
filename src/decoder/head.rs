//! ステータス行とレスポンスヘッダーの定義

use std::fmt;

use crate::error::ProtocolError;

/// HTTP バージョン
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HttpVersion {
    pub major: u8,
    pub minor: u8,
}

impl HttpVersion {
    pub const HTTP_1_0: HttpVersion = HttpVersion { major: 1, minor: 0 };
    pub const HTTP_1_1: HttpVersion = HttpVersion { major: 1, minor: 1 };

    /// `HTTP/<major>.<minor>` をパース (RFC 9112 Section 2.3)
    ///
    /// HTTP-version = HTTP-name "/" DIGIT "." DIGIT
    pub fn parse(s: &str) -> Result<Self, ProtocolError> {
        let invalid = || ProtocolError::InvalidData(format!("invalid HTTP version: {s:?}"));
        let rest = s.strip_prefix("HTTP/").ok_or_else(invalid)?;
        match rest.as_bytes() {
            [major @ b'0'..=b'9', b'.', minor @ b'0'..=b'9'] => Ok(Self {
                major: major - b'0',
                minor: minor - b'0',
            }),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP/{}.{}", self.major, self.minor)
    }
}

/// パース済みのステータス行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub version: HttpVersion,
    pub status_code: u16,
    pub reason_phrase: String,
}

/// ステータス行をパース (RFC 9112 Section 4)
///
/// status-line = HTTP-version SP status-code SP [ reason-phrase ]
///
/// reason-phrase がなく SP も省略された行も受け付ける。
pub fn parse_status_line(line: &str) -> Result<StatusLine, ProtocolError> {
    let invalid = || ProtocolError::InvalidData(format!("invalid status line: {line:?}"));

    let (version, rest) = line.split_once(' ').ok_or_else(invalid)?;
    let version = HttpVersion::parse(version)?;

    let (code, reason) = match rest.split_once(' ') {
        Some((code, reason)) => (code, reason),
        None => (rest, ""),
    };
    if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ProtocolError::InvalidData(format!(
            "invalid status code: {code:?}"
        )));
    }
    let status_code: u16 = code.parse().map_err(|_| invalid())?;
    if !is_valid_status_code(status_code) {
        return Err(ProtocolError::InvalidData(format!(
            "invalid status code: {status_code}"
        )));
    }
    if !is_valid_reason_phrase(reason) {
        return Err(ProtocolError::InvalidData(
            "invalid reason phrase: contains control characters".to_string(),
        ));
    }

    Ok(StatusLine {
        version,
        status_code,
        reason_phrase: reason.to_string(),
    })
}

/// ステータスコードが有効か確認 (RFC 9110 Section 15)
fn is_valid_status_code(code: u16) -> bool {
    (100..=599).contains(&code)
}

/// reason-phrase が有効か確認 (RFC 9112 Section 4)
///
/// reason-phrase = 1*( HTAB / SP / VCHAR / obs-text )
fn is_valid_reason_phrase(phrase: &str) -> bool {
    phrase
        .bytes()
        .all(|b| matches!(b, 0x09 | 0x20..=0x7E | 0x80..=0xFF))
}

/// レスポンスヘッダー（ボディなし）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    /// HTTP バージョン
    pub version: HttpVersion,
    /// ステータスコード (200, 404, etc.)
    pub status_code: u16,
    /// ステータスフレーズ (OK, Not Found, etc.)
    pub reason_phrase: String,
    /// ヘッダー (受信順)
    pub headers: Vec<(String, String)>,
}

impl ResponseHead {
    /// ヘッダーを取得 (大文字小文字を区別しない)
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// ステータスコードが情報レスポンス (1xx) か確認
    pub fn is_informational(&self) -> bool {
        (100..200).contains(&self.status_code)
    }
}
