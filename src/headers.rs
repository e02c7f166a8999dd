//! ヘッダーマップ

use crate::decoder::{is_valid_field_value, is_valid_header_name};
use crate::error::{Error, Result};

/// 大文字小文字を区別しないヘッダーマップ
///
/// 名前ごとに 1 エントリだけを持ち、同じ名前の値は `", "` で連結する。
/// 挿入順を保持し、名前は最初に挿入したときの表記で出力する。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    /// 値を設定する (既存の値は置き換える)
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(i) => self.entries[i].1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// 値を追加する (既存の値があれば `", "` で連結する)
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(i) => {
                let current = &mut self.entries[i].1;
                current.push_str(", ");
                current.push_str(&value);
            }
            None => self.entries.push((name, value)),
        }
    }

    /// 値を取得 (大文字小文字を区別しない)
    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name).map(|i| self.entries[i].1.as_str())
    }

    /// 削除して値を返す
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.position(name).map(|i| self.entries.remove(i).1)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// 挿入順に `(名前, 値)` を返す
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.append(name, value);
        }
        headers
    }
}

impl From<Vec<(String, String)>> for Headers {
    fn from(list: Vec<(String, String)>) -> Self {
        list.into_iter().collect()
    }
}

/// 送信するヘッダーを検証する
///
/// 名前は RFC 9110 の token、値は CR/LF/NUL などの制御文字を含まないこと。
pub fn validate_header(name: &str, value: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_header(name, "empty header name"));
    }
    if !is_valid_header_name(name) {
        return Err(Error::invalid_header(
            name,
            "header name must be an RFC 9110 token",
        ));
    }
    if !is_valid_field_value(value) {
        return Err(Error::invalid_header(
            name,
            "header value contains CR, LF or other control characters",
        ));
    }
    if value.starts_with([' ', '\t']) || value.ends_with([' ', '\t']) {
        return Err(Error::invalid_header(
            name,
            "header value has leading or trailing whitespace",
        ));
    }
    Ok(())
}
