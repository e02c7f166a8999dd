//! トランスポートを使う HTTP/HTTPS クライアントの例
//!
//! 使い方:
//!   cargo run -p http11_get -- https://example.com/
//!   cargo run -p http11_get -- --output index.html https://example.com/
//!   cargo run -p http11_get -- --upload ./data.bin http://127.0.0.1:8080/blob
//!
//! `RUST_LOG=shiguredo_http11_transport=debug` で状態遷移を表示する。

use std::io::Write;
use std::time::Duration;

use shiguredo_http11_transport::{
    Context, FileReader, FileWriter, HttpTransport, Method, Request, Transport,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut args = noargs::raw_args();
    args.metadata_mut().app_name = "http11_get";

    // --help フラグ
    noargs::HELP_FLAG.take_help(&mut args);

    // --version フラグ
    let version_flag: bool = noargs::flag("version")
        .short('V')
        .doc("Show version")
        .take(&mut args)
        .is_present();
    if version_flag {
        println!("{}", env!("CARGO_PKG_VERSION"));
        std::process::exit(0);
    }

    // --head フラグ
    let head: bool = noargs::flag("head")
        .short('I')
        .doc("Send a HEAD request and print only the headers")
        .take(&mut args)
        .is_present();

    // --timeout オプション
    let timeout: u64 = noargs::opt("timeout")
        .short('t')
        .doc("Overall timeout in seconds (default: 30)")
        .default("30")
        .take(&mut args)
        .then(|o| o.value().parse())
        .map_err(|e| format!("{:?}", e))?;

    // --output オプション
    let output: Option<String> = noargs::opt("output")
        .short('o')
        .doc("Write the response body to this file instead of stdout")
        .take(&mut args)
        .present_and_then(|o| Ok::<_, &str>(o.value().to_string()))
        .map_err(|e| format!("{:?}", e))?;

    // --upload オプション
    let upload: Option<String> = noargs::opt("upload")
        .short('u')
        .doc("PUT the contents of this file")
        .take(&mut args)
        .present_and_then(|o| Ok::<_, &str>(o.value().to_string()))
        .map_err(|e| format!("{:?}", e))?;

    // 位置引数: URL
    let url: String = noargs::arg("<URL>")
        .doc("URL to fetch (e.g., https://example.com/)")
        .take(&mut args)
        .then(|a| Ok::<_, &str>(a.value().to_string()))
        .map_err(|e| format!("{:?}", e))?;

    // 未知の引数があればエラー、ヘルプが返されたら表示
    if let Some(help) = args.finish().map_err(|e| format!("{:?}", e))? {
        print!("{}", help);
        return Ok(());
    }

    let ctx = Context::new().with_timeout(Duration::from_secs(timeout));
    let transport = Transport::new();

    let reader = upload.map(FileReader::open).transpose()?;
    let mut upload_body = reader.as_ref().map(FileReader::whole_body_stream);

    let method = match (&upload_body, head) {
        (Some(_), _) => Method::Put,
        (None, true) => Method::Head,
        (None, false) => Method::Get,
    };
    let mut request = Request::parse(method, &url)?.header("Accept", "*/*");
    if let Some(body) = upload_body.as_mut() {
        request = request.body(body);
    }

    let mut response = transport.send(&ctx, &mut request)?;

    eprintln!(
        "HTTP/{}.{} {} {}",
        response.major_version(),
        response.minor_version(),
        response.status_code(),
        response.reason_phrase()
    );
    for (name, value) in response.headers().iter() {
        eprintln!("{}: {}", name, value);
    }
    eprintln!();

    let body = response.body_mut();
    let mut buf = vec![0u8; 64 * 1024];
    match output {
        Some(path) => {
            let writer = FileWriter::create(&path)?;
            let mut offset = 0u64;
            loop {
                let n = body.read(&ctx, &mut buf)?;
                if n == 0 {
                    break;
                }
                writer.write_at(&buf[..n], offset)?;
                offset += n as u64;
            }
            writer.sync()?;
            eprintln!("Saved {} bytes to {}", offset, path);
        }
        None => {
            let stdout = std::io::stdout();
            let mut stdout = stdout.lock();
            loop {
                let n = body.read(&ctx, &mut buf)?;
                if n == 0 {
                    break;
                }
                stdout.write_all(&buf[..n])?;
            }
            stdout.flush()?;
        }
    }

    Ok(())
}
