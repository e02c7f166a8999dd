#![no_main]

use libfuzzer_sys::fuzz_target;
use shiguredo_http11_transport::{BodyProgress, DecoderLimits, ResponseDecoder};

/// ボディを取り出せるだけ取り出す
fn drain(decoder: &mut ResponseDecoder) {
    loop {
        if let Some(body_data) = decoder.peek_body() {
            let len = body_data.len();
            match decoder.consume_body(len) {
                Ok(BodyProgress::Complete { .. }) | Err(_) => return,
                Ok(BodyProgress::Continue) => continue,
            }
        }
        let before = decoder.remaining().len();
        match decoder.progress() {
            Ok(BodyProgress::Complete { .. }) | Err(_) => return,
            Ok(BodyProgress::Continue) => {
                if decoder.remaining().len() == before && decoder.peek_body().is_none() {
                    return;
                }
            }
        }
    }
}

fuzz_target!(|data: &[u8]| {
    // 通常のレスポンスデコード
    let mut decoder = ResponseDecoder::new();
    if decoder.feed(data).is_ok() {
        if let Ok(Some(_)) = decoder.decode_headers() {
            drain(&mut decoder);
            decoder.mark_eof();
        }
    }

    // HEAD リクエストへのレスポンスとしてデコード
    let mut decoder = ResponseDecoder::new();
    decoder.set_expect_no_body(true);
    if decoder.feed(data).is_ok() {
        let _ = decoder.decode_headers();
    }

    // 小さい制限でデータを分割して feed (ストリーミングシナリオ)
    let limits = DecoderLimits {
        max_buffer_size: 256,
        max_headers_count: 8,
        max_header_line_size: 64,
        max_chunk_line_size: 16,
    };
    let mut decoder = ResponseDecoder::with_limits(limits);
    let mut headers_done = false;
    for chunk in data.chunks(23) {
        if decoder.feed(chunk).is_err() {
            return;
        }
        if !headers_done {
            match decoder.decode_headers() {
                Ok(Some(_)) => headers_done = true,
                Ok(None) => continue,
                Err(_) => return,
            }
        }
        drain(&mut decoder);
    }
    if headers_done {
        decoder.mark_eof();
    }
});
