//! ボディデコードのテスト
//!
//! 不完全なボディ (接続切断シナリオ) が正しく検出されることを確認する。
//!
//! デコーダーは不完全なデータを与えられても `Continue` を返すだけで、切断そのものは
//! 知らない。切断を検出するのはデコーダーを使う側の責務で、トランスポートは
//! 次の手順でこれを判定している。
//!
//! - `peek_body()` が `None` を返しても `progress()` で状態遷移を試みる
//! - 接続が閉じたら `mark_eof()` を呼ぶ
//! - その後 `is_complete()` が `false` なら途中で切断された
//!
//! このテストはその前提となるデコーダーの振る舞いを固定する。

use shiguredo_http11_transport::{BodyKind, BodyProgress, ResponseDecoder};

/// peek/consume/progress でボディを取り出せるだけ取り出す
///
/// Complete に到達したかどうかを返す。
fn drain(decoder: &mut ResponseDecoder, body: &mut Vec<u8>) -> bool {
    loop {
        if let Some(data) = decoder.peek_body() {
            body.extend_from_slice(data);
            let len = data.len();
            if let BodyProgress::Complete { .. } = decoder.consume_body(len).unwrap() {
                return true;
            }
            continue;
        }
        // peek_body() が None でも progress() で状態遷移を試みる
        let remaining_before = decoder.remaining().len();
        match decoder.progress().unwrap() {
            BodyProgress::Complete { .. } => return true,
            BodyProgress::Continue => {
                // remaining が変化しなければデータ不足
                if decoder.remaining().len() == remaining_before && decoder.peek_body().is_none()
                {
                    return false;
                }
            }
        }
    }
}

/// 不完全な Content-Length レスポンスボディのテスト
///
/// サーバーが途中で切断した場合、Complete に到達しないことを確認する。
#[test]
fn incomplete_content_length_body() {
    let mut decoder = ResponseDecoder::new();
    decoder
        .feed(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\n")
        .unwrap();
    decoder.feed(&[0u8; 50]).unwrap(); // 100 バイト中 50 バイトのみ

    let (_, body_kind) = decoder.decode_headers().unwrap().unwrap();
    assert_eq!(body_kind, BodyKind::ContentLength(100));

    let mut body = Vec::new();
    assert!(!drain(&mut decoder, &mut body));
    assert_eq!(body.len(), 50);

    // 接続が閉じても固定長ボディは完了しない
    decoder.mark_eof();
    assert!(!decoder.is_complete());
    assert_eq!(decoder.body_consumed(), 50);
}

/// 不完全な Chunked レスポンスボディのテスト
///
/// 終端チャンクを受信する前に切断された場合、Complete に到達しないことを確認する。
#[test]
fn incomplete_chunked_body() {
    let mut decoder = ResponseDecoder::new();
    decoder
        .feed(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n")
        .unwrap();
    decoder.feed(b"5\r\nhello\r\n").unwrap(); // 終端チャンク "0\r\n\r\n" がない

    let (_, body_kind) = decoder.decode_headers().unwrap().unwrap();
    assert_eq!(body_kind, BodyKind::Chunked);

    let mut body = Vec::new();
    assert!(!drain(&mut decoder, &mut body));
    assert_eq!(body, b"hello");

    decoder.mark_eof();
    assert!(!decoder.is_complete());
}

/// チャンクデータの途中で切断された場合
#[test]
fn chunked_body_cut_inside_chunk() {
    let mut decoder = ResponseDecoder::new();
    decoder
        .feed(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\na\r\nhel")
        .unwrap();
    decoder.decode_headers().unwrap().unwrap();

    let mut body = Vec::new();
    assert!(!drain(&mut decoder, &mut body));
    assert_eq!(body, b"hel");
    decoder.mark_eof();
    assert!(!decoder.is_complete());
}

/// 完全な Content-Length レスポンスボディのテスト (正常系)
#[test]
fn complete_content_length_body() {
    let mut decoder = ResponseDecoder::new();
    decoder
        .feed(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello")
        .unwrap();

    let (_, body_kind) = decoder.decode_headers().unwrap().unwrap();
    assert_eq!(body_kind, BodyKind::ContentLength(5));

    let mut body = Vec::new();
    assert!(drain(&mut decoder, &mut body));
    assert_eq!(body, b"hello");
    assert!(decoder.is_complete());
}

/// 完全な Chunked レスポンスボディのテスト (正常系)
#[test]
fn complete_chunked_body() {
    let mut decoder = ResponseDecoder::new();
    decoder
        .feed(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n0\r\n\r\n")
        .unwrap();

    let (_, body_kind) = decoder.decode_headers().unwrap().unwrap();
    assert_eq!(body_kind, BodyKind::Chunked);

    let mut body = Vec::new();
    assert!(drain(&mut decoder, &mut body));
    assert_eq!(body, b"hello");
}

/// close-delimited レスポンスの mark_eof テスト
///
/// サーバーが接続を閉じた場合、mark_eof() を呼んで Complete に遷移することを確認する。
#[test]
fn close_delimited_mark_eof() {
    let mut decoder = ResponseDecoder::new();
    // Content-Length も Transfer-Encoding もない = close-delimited
    decoder.feed(b"HTTP/1.1 200 OK\r\n\r\n").unwrap();
    decoder.feed(b"hello world").unwrap();

    let (_, body_kind) = decoder.decode_headers().unwrap().unwrap();
    assert_eq!(body_kind, BodyKind::CloseDelimited);

    let mut body = Vec::new();
    while let Some(data) = decoder.peek_body() {
        body.extend_from_slice(data);
        let len = data.len();
        decoder.consume_body(len).unwrap();
    }

    // まだ Complete ではない
    assert!(decoder.is_close_delimited());
    assert!(!decoder.is_complete());

    decoder.mark_eof();

    assert!(!decoder.is_close_delimited());
    assert!(decoder.is_complete());
    assert_eq!(body, b"hello world");
}

/// 未消費のボディが残っている間は mark_eof() で完了しない
#[test]
fn close_delimited_mark_eof_with_buffered_body() {
    let mut decoder = ResponseDecoder::new();
    decoder.feed(b"HTTP/1.1 200 OK\r\n\r\nbody data").unwrap();
    decoder.decode_headers().unwrap().unwrap();

    decoder.mark_eof();
    assert!(decoder.is_close_delimited());
    assert_eq!(decoder.peek_body(), Some(&b"body data"[..]));

    decoder.consume_body(9).unwrap();
    decoder.mark_eof();
    assert!(decoder.is_complete());
}

/// Transfer-Encoding と Content-Length の両方がある場合のエラーテスト
///
/// RFC 9112 Section 6.3: リクエストスマグリングの原因になるため拒否する。
#[test]
fn transfer_encoding_with_content_length_should_fail() {
    let mut decoder = ResponseDecoder::new();
    decoder
        .feed(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nContent-Length: 5\r\n\r\n")
        .unwrap();

    let result = decoder.decode_headers();
    assert!(result.is_err());
}

/// HTTP/1.1 では Transfer-Encoding: chunked を受け付ける
#[test]
fn http11_with_transfer_encoding_should_succeed() {
    let mut decoder = ResponseDecoder::new();
    decoder
        .feed(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n0\r\n\r\n")
        .unwrap();

    let (head, body_kind) = decoder.decode_headers().unwrap().unwrap();
    assert_eq!(head.status_code, 200);
    assert_eq!(body_kind, BodyKind::Chunked);
}

/// chunked が最後のコーディングなら、前段のコーディングは解除せずにボディとして返す
#[test]
fn transfer_coding_before_chunked_is_passed_through() {
    let mut decoder = ResponseDecoder::new();
    decoder
        .feed(
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: gzip, chunked\r\n\r\n\
              3\r\n\x1f\x8b\x08\r\n0\r\n\r\n",
        )
        .unwrap();

    let (head, body_kind) = decoder.decode_headers().unwrap().unwrap();
    assert_eq!(head.get_header("transfer-encoding"), Some("gzip, chunked"));
    assert_eq!(body_kind, BodyKind::Chunked);

    let mut body = Vec::new();
    assert!(drain(&mut decoder, &mut body));
    assert_eq!(body, b"\x1f\x8b\x08");
}

/// 最後のコーディングが chunked でなければ終端を判定できないので拒否する
#[test]
fn transfer_coding_without_final_chunked_should_fail() {
    for coding in ["gzip", "chunked, gzip"] {
        let mut decoder = ResponseDecoder::new();
        decoder
            .feed(format!("HTTP/1.1 200 OK\r\nTransfer-Encoding: {coding}\r\n\r\n").as_bytes())
            .unwrap();
        assert!(decoder.decode_headers().is_err(), "{coding}");
    }
}

/// チャンクデータの直後が CRLF でなければエラー
#[test]
fn chunk_data_without_crlf_should_fail() {
    let mut decoder = ResponseDecoder::new();
    decoder
        .feed(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nabcXX0\r\n\r\n")
        .unwrap();
    decoder.decode_headers().unwrap().unwrap();

    assert!(decoder.peek_body().is_none());
    decoder.progress().unwrap();
    assert_eq!(decoder.peek_body(), Some(&b"abc"[..]));
    assert!(decoder.consume_body(3).is_err());
}
