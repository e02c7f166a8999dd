//! エラー型

use std::fmt;
use std::io;

/// Result 型エイリアス
pub type Result<T> = std::result::Result<T, Error>;

/// トランスポートのどの段階で失敗したか
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// 名前解決・接続確立
    Connect,
    /// リクエストヘッダー・ボディの送信
    Send,
    /// レスポンスヘッダー・ボディの受信
    Receive,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Connect => write!(f, "connect"),
            Phase::Send => write!(f, "send"),
            Phase::Receive => write!(f, "receive"),
        }
    }
}

/// エラーの分類
///
/// リトライ判定など、呼び出し側が失敗の種類だけを見たい場合に使う。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Connect,
    Send,
    Receive,
    HeaderParse,
    Cancelled,
    NotSupported,
    InvalidHeader,
    InvalidUrl,
    Io,
}

/// HTTP メッセージのパースエラー
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// 不正なデータ
    #[error("invalid data: {0}")]
    InvalidData(String),
    /// バッファサイズ超過
    #[error("buffer overflow: {size} > {limit}")]
    BufferOverflow { size: usize, limit: usize },
    /// ヘッダー数超過
    #[error("too many headers: {count} > {limit}")]
    TooManyHeaders { count: usize, limit: usize },
    /// ヘッダー行が長すぎる
    #[error("header line too long: {size} > {limit}")]
    HeaderLineTooLong { size: usize, limit: usize },
    /// チャンクサイズ行が長すぎる
    #[error("chunk line too long: {size} > {limit}")]
    ChunkLineTooLong { size: usize, limit: usize },
}

/// トランスポート・ボディストリームのエラー
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// 接続・送信・受信の失敗
    ///
    /// `code` は OS のエラーコード (取得できた場合)。
    #[error("transport error ({phase}): {message}")]
    Transport {
        phase: Phase,
        code: Option<i32>,
        message: String,
        #[source]
        source: Option<io::Error>,
    },
    /// ステータス行・ヘッダー・ボディのフレーミングが不正
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    /// Context によってキャンセルされた
    #[error("operation cancelled")]
    Cancelled,
    /// ストリームが対応していない操作
    #[error("not supported: {0}")]
    NotSupported(String),
    /// 送信できないヘッダー
    #[error("invalid header {name:?}: {reason}")]
    InvalidHeader { name: String, reason: String },
    /// 不正な URL
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    /// ファイル I/O エラー
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// I/O エラーからトランスポートエラーを作る
    pub(crate) fn transport(phase: Phase, message: &str, source: io::Error) -> Self {
        let code = source.raw_os_error();
        let message = match code {
            Some(code) => format!("{message}: {source} (error code: {code})"),
            None => format!("{message}: {source}"),
        };
        Error::Transport {
            phase,
            code,
            message,
            source: Some(source),
        }
    }

    /// 元になる I/O エラーのないトランスポートエラーを作る
    pub(crate) fn transport_msg(phase: Phase, message: impl Into<String>) -> Self {
        Error::Transport {
            phase,
            code: None,
            message: message.into(),
            source: None,
        }
    }

    pub(crate) fn invalid_header(name: &str, reason: &str) -> Self {
        Error::InvalidHeader {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }

    /// エラーの分類を取得
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Transport { phase, .. } => match phase {
                Phase::Connect => ErrorKind::Connect,
                Phase::Send => ErrorKind::Send,
                Phase::Receive => ErrorKind::Receive,
            },
            Error::Protocol(_) => ErrorKind::HeaderParse,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::NotSupported(_) => ErrorKind::NotSupported,
            Error::InvalidHeader { .. } => ErrorKind::InvalidHeader,
            Error::InvalidUrl(_) => ErrorKind::InvalidUrl,
            Error::Io(_) => ErrorKind::Io,
        }
    }

    /// プラットフォームのエラーコードを取得
    pub fn code(&self) -> Option<i32> {
        match self {
            Error::Transport { code, .. } => *code,
            Error::Io(e) => e.raw_os_error(),
            _ => None,
        }
    }

    /// トランスポートエラーの段階を取得
    pub fn phase(&self) -> Option<Phase> {
        match self {
            Error::Transport { phase, .. } => Some(*phase),
            _ => None,
        }
    }

    /// キャンセルによるエラーかどうか
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}
