//! 結合テスト用のスクリプト化したソケット層
//!
//! `MockConnector` は用意したレスポンスのバイト列を返し、セッションと接続の
//! 開閉をイベントとして記録する。

#![allow(dead_code)]

use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use shiguredo_http11_transport::{
    Connection, Connector, Context, Error, Phase, Result, Session, Transport, TransportOptions,
};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    OpenSession,
    Connect,
    CloseConnection,
    CloseSession,
}

/// ソケット層の振る舞い
#[derive(Debug, Clone, Default)]
pub struct Script {
    /// 接続から読まれるレスポンス
    pub response: Vec<u8>,
    /// 1 回の read で返す最大バイト数 (0 は無制限)
    pub read_chunk: usize,
    /// このバイト数を返した後は読み取りタイムアウトを返し続ける
    pub stall_after: Option<usize>,
    pub fail_session: bool,
    pub fail_connect: bool,
    pub fail_write: bool,
}

impl Script {
    pub fn respond(response: &[u8]) -> Self {
        Self {
            response: response.to_vec(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    events: Mutex<Vec<Event>>,
    written: Mutex<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct MockConnector {
    script: Script,
    shared: Arc<Shared>,
}

impl MockConnector {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            shared: Arc::default(),
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.shared.events.lock().unwrap().clone()
    }

    /// 接続に書き込まれたバイト列
    pub fn written(&self) -> Vec<u8> {
        self.shared.written.lock().unwrap().clone()
    }

    pub fn written_text(&self) -> String {
        String::from_utf8(self.written()).unwrap()
    }

    fn push(&self, event: Event) {
        self.shared.events.lock().unwrap().push(event);
    }
}

impl Connector for MockConnector {
    fn open_session(&self, _ctx: &Context, _url: &Url) -> Result<Box<dyn Session>> {
        if self.script.fail_session {
            return Err(Error::Transport {
                phase: Phase::Connect,
                code: Some(-2),
                message: "name resolution failed".to_string(),
                source: None,
            });
        }
        self.push(Event::OpenSession);
        Ok(Box::new(MockSession(self.clone())))
    }
}

struct MockSession(MockConnector);

impl Session for MockSession {
    fn connect(&mut self, _ctx: &Context, _timeout: Duration) -> Result<Box<dyn Connection>> {
        if self.0.script.fail_connect {
            return Err(Error::Transport {
                phase: Phase::Connect,
                code: Some(111),
                message: "connection refused".to_string(),
                source: None,
            });
        }
        self.0.push(Event::Connect);
        Ok(Box::new(MockConnection {
            connector: self.0.clone(),
            position: 0,
            read_timeout: None,
        }))
    }

    fn close(&mut self) -> io::Result<()> {
        self.0.push(Event::CloseSession);
        Ok(())
    }
}

struct MockConnection {
    connector: MockConnector,
    position: usize,
    read_timeout: Option<Duration>,
}

impl Read for MockConnection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let script = &self.connector.script;
        let mut end = script.response.len();
        if let Some(stall) = script.stall_after {
            if self.position >= stall {
                // 何も届かないソケットと同じく、タイムアウトまで待ってから戻る
                std::thread::sleep(self.read_timeout.unwrap_or(Duration::from_millis(5)));
                return Err(io::ErrorKind::WouldBlock.into());
            }
            end = end.min(stall);
        }
        let mut n = (end - self.position).min(buf.len());
        if script.read_chunk > 0 {
            n = n.min(script.read_chunk);
        }
        buf[..n].copy_from_slice(&script.response[self.position..self.position + n]);
        self.position += n;
        Ok(n)
    }
}

impl Write for MockConnection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.connector.script.fail_write {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        self.connector
            .shared
            .written
            .lock()
            .unwrap()
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Connection for MockConnection {
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.read_timeout = timeout;
        Ok(())
    }

    fn set_write_timeout(&mut self, _timeout: Option<Duration>) -> io::Result<()> {
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        self.connector.push(Event::CloseConnection);
        Ok(())
    }
}

/// ポーリング間隔を短くしたトランスポート
pub fn transport(connector: &MockConnector) -> Transport {
    Transport::new()
        .connector(connector.clone())
        .options(TransportOptions {
            poll_interval: Duration::from_millis(5),
            ..TransportOptions::default()
        })
}

pub const FULL_LIFECYCLE: [Event; 4] = [
    Event::OpenSession,
    Event::Connect,
    Event::CloseConnection,
    Event::CloseSession,
];
