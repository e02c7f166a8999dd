//! ソケット層
//!
//! セッション (名前解決と TLS 設定) と接続 (TCP または TCP + TLS) を開く。
//! テストや別のソケット実装は `Connector` を実装して差し替える。

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, StreamOwned};
use rustls_platform_verifier::ConfigVerifierExt;
use url::{Host, Url};

use crate::context::Context;
use crate::error::{Error, Phase, Result};

/// URL ごとにセッションを開く
pub trait Connector: Send + Sync {
    /// セッションを開く
    ///
    /// 失敗は `Phase::Connect` のトランスポートエラー。
    fn open_session(&self, ctx: &Context, url: &Url) -> Result<Box<dyn Session>>;
}

/// 接続先 1 つ分の状態 (解決済みアドレス、TLS 設定)
pub trait Session: Send {
    /// 接続を開く
    ///
    /// `timeout` は接続確立 (TLS ハンドシェイクを含む) の上限。
    fn connect(&mut self, ctx: &Context, timeout: Duration) -> Result<Box<dyn Connection>>;

    /// セッションを閉じる
    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// 開いた接続
pub trait Connection: Read + Write + Send {
    /// 読み取りタイムアウトを設定する
    ///
    /// タイムアウトした `read` は `WouldBlock` か `TimedOut` を返すこと。
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()>;

    /// 書き込みタイムアウトを設定する
    fn set_write_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()>;

    /// 接続を閉じる
    fn close(&mut self) -> io::Result<()>;
}

/// `std::net::TcpStream` と rustls を使う既定の `Connector`
///
/// TLS 設定を指定しない場合、最初の https セッションでプラットフォームの
/// 証明書検証器を使う設定を作る。
pub struct TcpConnector {
    tls_config: Mutex<Option<Arc<ClientConfig>>>,
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TcpConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpConnector").finish_non_exhaustive()
    }
}

impl TcpConnector {
    pub fn new() -> Self {
        Self {
            tls_config: Mutex::new(None),
        }
    }

    /// TLS 設定を指定して作成
    pub fn with_tls_config(config: Arc<ClientConfig>) -> Self {
        Self {
            tls_config: Mutex::new(Some(config)),
        }
    }

    fn tls_config(&self) -> Result<Arc<ClientConfig>> {
        let mut slot = self
            .tls_config
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(config) = slot.as_ref() {
            return Ok(config.clone());
        }
        // OS のルート証明書ストアを使用する
        let config = ClientConfig::with_platform_verifier().map_err(|e| {
            Error::transport_msg(
                Phase::Connect,
                format!("failed to load platform certificate verifier: {e}"),
            )
        })?;
        let config = Arc::new(config);
        *slot = Some(config.clone());
        Ok(config)
    }
}

impl Connector for TcpConnector {
    fn open_session(&self, ctx: &Context, url: &Url) -> Result<Box<dyn Session>> {
        let https = match url.scheme() {
            "http" => false,
            "https" => true,
            other => return Err(Error::InvalidUrl(format!("unsupported scheme: {other}"))),
        };
        let host = match url.host() {
            Some(Host::Domain(domain)) => domain.to_string(),
            Some(Host::Ipv4(ip)) => ip.to_string(),
            Some(Host::Ipv6(ip)) => ip.to_string(),
            None => return Err(Error::InvalidUrl(format!("{url}: missing host"))),
        };

        ctx.check()?;
        let addrs = url.socket_addrs(|| None).map_err(|e| {
            Error::transport(Phase::Connect, &format!("failed to resolve {host}"), e)
        })?;
        if addrs.is_empty() {
            return Err(Error::transport_msg(
                Phase::Connect,
                format!("{host} did not resolve to any address"),
            ));
        }
        tracing::trace!(%host, addrs = addrs.len(), "resolved");

        let tls = if https {
            let server_name = ServerName::try_from(host.clone())
                .map_err(|e| Error::InvalidUrl(format!("invalid TLS server name {host}: {e}")))?;
            Some((self.tls_config()?, server_name))
        } else {
            None
        };

        Ok(Box::new(TcpSession { host, addrs, tls }))
    }
}

struct TcpSession {
    host: String,
    addrs: Vec<SocketAddr>,
    tls: Option<(Arc<ClientConfig>, ServerName<'static>)>,
}

impl TcpSession {
    fn connect_tcp(&self, ctx: &Context, timeout: Duration) -> Result<TcpStream> {
        let mut last_error = None;
        for addr in &self.addrs {
            ctx.check()?;
            match TcpStream::connect_timeout(addr, ctx.bound(timeout)) {
                Ok(stream) => {
                    tracing::trace!(%addr, "connected");
                    return Ok(stream);
                }
                Err(e) => {
                    tracing::debug!(%addr, error = %e, "connect attempt failed");
                    last_error = Some(e);
                }
            }
        }
        // 期限切れで打ち切った場合はキャンセルとして返す
        ctx.check()?;
        Err(match last_error {
            Some(e) => Error::transport(
                Phase::Connect,
                &format!("failed to connect to {}", self.host),
                e,
            ),
            None => Error::transport_msg(
                Phase::Connect,
                format!("no address to connect to for {}", self.host),
            ),
        })
    }
}

impl Session for TcpSession {
    fn connect(&mut self, ctx: &Context, timeout: Duration) -> Result<Box<dyn Connection>> {
        let stream = self.connect_tcp(ctx, timeout)?;
        stream
            .set_nodelay(true)
            .map_err(|e| Error::transport(Phase::Connect, "failed to set TCP_NODELAY", e))?;

        let Some((config, server_name)) = &self.tls else {
            return Ok(Box::new(TcpConnection(stream)));
        };

        let conn = ClientConnection::new(config.clone(), server_name.clone()).map_err(|e| {
            Error::transport_msg(Phase::Connect, format!("failed to start TLS session: {e}"))
        })?;
        let mut tls = StreamOwned::new(conn, stream);
        while tls.conn.is_handshaking() {
            ctx.check()?;
            let limit = Some(ctx.bound(timeout));
            tls.sock
                .set_read_timeout(limit)
                .and_then(|()| tls.sock.set_write_timeout(limit))
                .map_err(|e| Error::transport(Phase::Connect, "failed to set socket timeout", e))?;
            match tls.conn.complete_io(&mut tls.sock) {
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    ctx.check()?;
                    return Err(Error::transport(Phase::Connect, "TLS handshake failed", e));
                }
            }
        }
        tracing::trace!(
            version = ?tls.conn.protocol_version(),
            "TLS handshake complete"
        );
        Ok(Box::new(TlsConnection(tls)))
    }
}

struct TcpConnection(TcpStream);

impl Read for TcpConnection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl Write for TcpConnection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl Connection for TcpConnection {
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.0.set_read_timeout(timeout)
    }

    fn set_write_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.0.set_write_timeout(timeout)
    }

    fn close(&mut self) -> io::Result<()> {
        shutdown(&self.0)
    }
}

struct TlsConnection(StreamOwned<ClientConnection, TcpStream>);

impl Read for TlsConnection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl Write for TlsConnection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl Connection for TlsConnection {
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.0.sock.set_read_timeout(timeout)
    }

    fn set_write_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.0.sock.set_write_timeout(timeout)
    }

    fn close(&mut self) -> io::Result<()> {
        self.0.conn.send_close_notify();
        let notify = (|| {
            while self.0.conn.wants_write() {
                self.0.conn.write_tls(&mut self.0.sock)?;
            }
            Ok::<_, io::Error>(())
        })();
        let shut = shutdown(&self.0.sock);
        notify.and(shut)
    }
}

/// 相手が先に閉じていた場合の NotConnected は成功として扱う
fn shutdown(stream: &TcpStream) -> io::Result<()> {
    match stream.shutdown(Shutdown::Both) {
        Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn unsupported_scheme() {
        let connector = TcpConnector::new();
        let url = Url::parse("ftp://example.com/").unwrap();
        let err = connector
            .open_session(&Context::new(), &url)
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidUrl);
    }

    #[test]
    fn cancelled_before_resolve() {
        let connector = TcpConnector::new();
        let ctx = Context::new();
        ctx.cancel();
        let url = Url::parse("http://localhost/").unwrap();
        let err = connector.open_session(&ctx, &url).err().unwrap();
        assert!(err.is_cancelled());
    }

    #[test]
    fn connection_refused_is_connect_error() {
        // 一度バインドして閉じたポートには誰も待ち受けていない
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let connector = TcpConnector::new();
        let url = Url::parse(&format!("http://127.0.0.1:{port}/")).unwrap();
        let ctx = Context::new();
        let mut session = connector.open_session(&ctx, &url).unwrap();
        let err = session
            .connect(&ctx, Duration::from_secs(5))
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Connect);
        assert!(session.close().is_ok());
    }

    #[test]
    fn plain_connection_round_trip() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 4];
            stream.read_exact(&mut buf).unwrap();
            stream.write_all(&buf).unwrap();
        });

        let connector = TcpConnector::new();
        let url = Url::parse(&format!("http://{addr}/")).unwrap();
        let ctx = Context::new();
        let mut session = connector.open_session(&ctx, &url).unwrap();
        let mut conn = session.connect(&ctx, Duration::from_secs(5)).unwrap();
        conn.write_all(b"ping").unwrap();
        let mut buf = [0u8; 4];
        conn.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");
        conn.close().unwrap();
        server.join().unwrap();
    }
}
