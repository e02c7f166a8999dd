//! PBT テスト共通ユーティリティ

use proptest::prelude::*;

// ========================================
// HTTP 要素の生成
// ========================================

fn token_char() -> impl Strategy<Value = char> {
    prop_oneof![
        prop::char::range('a', 'z'),
        prop::char::range('A', 'Z'),
        prop::char::range('0', '9'),
        Just('-'),
        Just('_'),
        Just('.'),
    ]
}

/// ヘッダー名 (token)
pub fn header_name() -> impl Strategy<Value = String> {
    proptest::collection::vec(token_char(), 1..=32).prop_map(|chars| chars.into_iter().collect())
}

/// ヘッダー値 (前後に空白を持たない可視文字列)
pub fn header_value() -> impl Strategy<Value = String> {
    "[!-~]([ !-~]{0,62}[!-~])?".prop_map(|s| s)
}

/// ステータスコード
pub fn status_code() -> impl Strategy<Value = u16> {
    prop_oneof![200u16..=206, 300u16..=308, 400u16..=451, 500u16..=511]
}

/// 理由フレーズ
pub fn reason_phrase() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("OK".to_string()),
        Just("Not Found".to_string()),
        "[A-Za-z ]{1,32}".prop_map(|s| s),
    ]
}

/// ボディ
pub fn body() -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec(any::<u8>(), 0..512)
}

/// 読み取りごとのバッファサイズ
pub fn read_sizes() -> impl Strategy<Value = Vec<usize>> {
    proptest::collection::vec(1usize..64, 1..16)
}

// ========================================
// メッセージ生成
// ========================================

/// ボディを chunk_size ごとに分けた chunked エンコーディング
pub fn encode_chunked(body: &[u8], chunk_size: usize) -> Vec<u8> {
    let mut out = Vec::new();
    for chunk in body.chunks(chunk_size.max(1)) {
        out.extend(format!("{:x}\r\n", chunk.len()).as_bytes());
        out.extend(chunk);
        out.extend(b"\r\n");
    }
    out.extend(b"0\r\n\r\n");
    out
}

/// データを `sizes` の長さで繰り返し分割する
pub fn split_by<'a>(data: &'a [u8], sizes: &'a [usize]) -> Vec<&'a [u8]> {
    let mut parts = Vec::new();
    let mut rest = data;
    let mut i = 0;
    while !rest.is_empty() {
        let size = sizes
            .get(i % sizes.len().max(1))
            .copied()
            .unwrap_or(1)
            .max(1);
        let n = size.min(rest.len());
        parts.push(&rest[..n]);
        rest = &rest[n..];
        i += 1;
    }
    parts
}
