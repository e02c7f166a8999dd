//! ファイル読み書きの補助
//!
//! アップロード元のファイルを `FileBodyStream` で送り、ダウンロードしたボディを
//! 位置指定書き込みで保存するために使う。

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

use crate::body_stream::FileBodyStream;
use crate::error::{Error, Result};

/// 読み取り用に開いたファイルとそのサイズ
#[derive(Debug)]
pub struct FileReader {
    file: File,
    size: u64,
}

impl FileReader {
    /// ファイルを読み取り専用で開く
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        Ok(Self { file, size })
    }

    /// ファイルハンドル
    pub fn file(&self) -> &File {
        &self.file
    }

    /// 開いた時点のファイルサイズ
    pub fn size(&self) -> u64 {
        self.size
    }

    /// `[offset, offset + length)` を読むストリームを作成
    ///
    /// 範囲がファイルサイズを超える場合はエラー。
    pub fn body_stream(&self, offset: u64, length: u64) -> Result<FileBodyStream<'_>> {
        let end = offset.checked_add(length).ok_or_else(|| {
            Error::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "file range overflows",
            ))
        })?;
        if end > self.size {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "file range {offset}..{end} is beyond the end of the file ({} bytes)",
                    self.size
                ),
            )));
        }
        Ok(FileBodyStream::new(&self.file, offset, length))
    }

    /// ファイル全体を読むストリームを作成
    pub fn whole_body_stream(&self) -> FileBodyStream<'_> {
        FileBodyStream::new(&self.file, 0, self.size)
    }
}

/// 書き込み用に開いたファイル
#[derive(Debug)]
pub struct FileWriter {
    file: File,
}

impl FileWriter {
    /// ファイルを作成する (既存なら切り詰める)
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Self { file })
    }

    /// ファイルハンドル
    pub fn file(&self) -> &File {
        &self.file
    }

    /// `offset` の位置に `buf` 全体を書き込む
    ///
    /// ファイルのカーソル位置は使わないため、複数の範囲を並行して書き込める。
    pub fn write_at(&self, buf: &[u8], offset: u64) -> Result<()> {
        let mut written = 0;
        while written < buf.len() {
            let n = match self.write_at_once(&buf[written..], offset + written as u64) {
                Ok(0) => {
                    return Err(Error::Io(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "failed to write file",
                    )));
                }
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Io(e)),
            };
            written += n;
        }
        Ok(())
    }

    #[cfg(unix)]
    fn write_at_once(&self, buf: &[u8], offset: u64) -> io::Result<usize> {
        use std::os::unix::fs::FileExt;
        self.file.write_at(buf, offset)
    }

    #[cfg(windows)]
    fn write_at_once(&self, buf: &[u8], offset: u64) -> io::Result<usize> {
        use std::os::windows::fs::FileExt;
        self.file.seek_write(buf, offset)
    }

    #[cfg(not(any(unix, windows)))]
    fn write_at_once(&self, buf: &[u8], offset: u64) -> io::Result<usize> {
        use std::io::{Seek, SeekFrom, Write};
        let mut file = &self.file;
        file.seek(SeekFrom::Start(offset))?;
        file.write(buf)
    }

    /// 書き込んだ内容をディスクに同期する
    pub fn sync(&self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}
