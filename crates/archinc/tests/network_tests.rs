//! Remote sources served by a one-shot local HTTP responder

use archinc::{Error, ResolutionIndex, ResolverConfig, SourceError};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread::{self, JoinHandle};
use tempfile::TempDir;

/// Answer exactly one request; the handle yields the raw request head
fn serve_once(status: &'static str, body: Vec<u8>) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            let n = stream.read(&mut buf).unwrap();
            request.extend_from_slice(&buf[..n]);
            if n == 0 || request.windows(4).any(|w| w == b"\r\n\r\n") {
                break;
            }
        }

        let head = format!(
            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            status,
            body.len()
        );
        stream.write_all(head.as_bytes()).unwrap();
        stream.write_all(&body).unwrap();
        stream.flush().unwrap();

        String::from_utf8_lossy(&request).into_owned()
    });

    (format!("http://{}", addr), handle)
}

fn dist_tgz(prefix: &str, files: &[(&str, &str)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, body) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, format!("{}/{}", prefix, path), body.as_bytes())
            .unwrap();
    }
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&builder.into_inner().unwrap()).unwrap();
    encoder.finish().unwrap()
}

#[test]
fn test_shorthand_fetch_failure_reports_url_and_status() {
    let temp = TempDir::new().unwrap();
    let (base, server) = serve_once("404 Not Found", b"missing".to_vec());
    let config = ResolverConfig::default().mirror_url(&base);

    let err = ResolutionIndex::build(
        &["CPAN://JSON-PP-2.97001.tar.gz"],
        &temp.path().join("caller.pl"),
        &config,
    )
    .unwrap_err();

    let expected_url = format!("{}/modules/by-module/JSON/JSON-PP-2.97001.tar.gz", base);
    let message = err.to_string();
    assert!(message.contains(&expected_url), "{}", message);
    assert!(message.contains("404"), "{}", message);
    assert!(matches!(err, Error::Source(SourceError::Fetch(_))));

    let request = server.join().unwrap();
    assert!(request.starts_with("GET /modules/by-module/JSON/JSON-PP-2.97001.tar.gz "));
}

#[test]
fn test_shorthand_fetch_indexes_distribution() {
    let temp = TempDir::new().unwrap();
    let body = dist_tgz(
        "JSON-PP-2.97001",
        &[
            ("lib/JSON/PP.pm", "package JSON::PP;"),
            ("lib/JSON/PP/Boolean.pm", "package JSON::PP::Boolean;"),
        ],
    );
    let (base, server) = serve_once("200 OK", body);
    let config = ResolverConfig::default().mirror_url(format!("{}/", base));

    let index = ResolutionIndex::build(
        &["cpan://JSON-PP-2.97001.tar.gz"],
        &temp.path().join("caller.pl"),
        &config,
    )
    .unwrap();
    server.join().unwrap();

    let entry = index.get("JSON/PP.pm").unwrap();
    assert_eq!(entry.content, b"package JSON::PP;");
    assert_eq!(entry.version, "2.97001");
    assert_eq!(
        entry.provenance,
        format!(
            "{}/modules/by-module/JSON/JSON-PP-2.97001.tar.gz/JSON-PP-2.97001/lib/JSON/PP.pm",
            base
        )
    );
    assert!(index.contains("JSON/PP/Boolean.pm"));
}

#[test]
fn test_direct_url() {
    let temp = TempDir::new().unwrap();
    let body = dist_tgz("Try-Tiny-0.31", &[("lib/Try/Tiny.pm", "package Try::Tiny;")]);
    let (base, server) = serve_once("200 OK", body);

    let url = format!("{}/dist/Try-Tiny-0.31.tar.gz", base);
    let index = ResolutionIndex::build(
        &[url.as_str()],
        &temp.path().join("caller.pl"),
        &ResolverConfig::default(),
    )
    .unwrap();
    server.join().unwrap();

    assert_eq!(index.get("Try/Tiny.pm").unwrap().version, "0.31");
}

#[test]
fn test_shorthand_without_top_level_name() {
    let temp = TempDir::new().unwrap();
    let result = ResolutionIndex::build(
        &["cpan://Standalone.tar.gz"],
        &temp.path().join("caller.pl"),
        &ResolverConfig::default(),
    );
    assert!(matches!(
        result,
        Err(Error::Source(SourceError::InvalidShorthand(_)))
    ));
}
