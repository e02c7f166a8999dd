//! ファイルの範囲を読むストリーム

use std::fs::File;
use std::io;

use crate::context::Context;
use crate::error::{Error, Result};

use super::BodyStream;

/// 呼び出し側が開いたファイルの `[offset, offset + length)` を読むストリーム
///
/// ファイルハンドルは呼び出し側が所有する。読み取りは位置指定 I/O で行うため、
/// ファイルのカーソル位置に依存しない。
///
/// 同じハンドルを複数のストリームやスレッドで共有する場合、このストリーム自身は
/// 自分の読み取り呼び出しだけを保護する。それ以上の排他は呼び出し側の責任。
#[derive(Debug)]
pub struct FileBodyStream<'f> {
    file: &'f File,
    base_offset: u64,
    length: u64,
    offset: u64,
    #[cfg(not(any(unix, windows)))]
    lock: std::sync::Mutex<()>,
}

impl<'f> FileBodyStream<'f> {
    /// `offset` から `length` バイトを読むストリームを作成
    pub fn new(file: &'f File, offset: u64, length: u64) -> Self {
        Self {
            file,
            base_offset: offset,
            length,
            offset: 0,
            #[cfg(not(any(unix, windows)))]
            lock: std::sync::Mutex::new(()),
        }
    }

    /// `offset` からファイル末尾までを読むストリームを作成
    pub fn from_offset(file: &'f File, offset: u64) -> Result<Self> {
        let size = file.metadata()?.len();
        if offset > size {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("offset {offset} is beyond the end of the file ({size} bytes)"),
            )));
        }
        Ok(Self::new(file, offset, size - offset))
    }

    /// 範囲内での現在位置
    pub fn position(&self) -> u64 {
        self.offset
    }

    #[cfg(unix)]
    fn read_at(&self, buf: &mut [u8], pos: u64) -> io::Result<usize> {
        use std::os::unix::fs::FileExt;
        self.file.read_at(buf, pos)
    }

    #[cfg(windows)]
    fn read_at(&self, buf: &mut [u8], pos: u64) -> io::Result<usize> {
        use std::os::windows::fs::FileExt;
        match self.file.seek_read(buf, pos) {
            // ERROR_HANDLE_EOF
            Err(e) if e.raw_os_error() == Some(38) => Ok(0),
            other => other,
        }
    }

    #[cfg(not(any(unix, windows)))]
    fn read_at(&self, buf: &mut [u8], pos: u64) -> io::Result<usize> {
        use std::io::{Read, Seek, SeekFrom};
        let _guard = self
            .lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut file = self.file;
        file.seek(SeekFrom::Start(pos))?;
        file.read(buf)
    }
}

impl BodyStream for FileBodyStream<'_> {
    fn length(&self) -> Option<u64> {
        Some(self.length)
    }

    fn rewind(&mut self) -> Result<()> {
        self.offset = 0;
        Ok(())
    }

    fn on_read(&mut self, _ctx: &Context, buf: &mut [u8]) -> Result<usize> {
        let remaining = self.length - self.offset;
        if remaining == 0 {
            return Ok(0);
        }
        let want = usize::try_from(remaining).map_or(buf.len(), |r| r.min(buf.len()));
        let n = loop {
            match self.read_at(&mut buf[..want], self.base_offset + self.offset) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                result => break result?,
            }
        };
        if n == 0 {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "file ended {remaining} bytes before the end of the range starting at {}",
                    self.base_offset
                ),
            )));
        }
        self.offset += n as u64;
        Ok(n)
    }
}
