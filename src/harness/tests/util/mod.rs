// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Stand-in engine endpoints shared by the integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::pin::Pin;

use openssl::asn1::Asn1Time;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::PKey;
use openssl::rsa::Rsa;
use openssl::ssl::{Ssl, SslAcceptor, SslMethod};
use openssl::x509::{X509, X509NameBuilder};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_openssl::SslStream;

/// Serves the PostgreSQL `SSLRequest` exchange the way Vertica does, declining
/// TLS. Returns the port.
pub async fn fake_vertica() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    dd_ore::task::spawn(|| "fake-vertica", async move {
        loop {
            let (mut conn, _) = listener.accept().await.unwrap();
            let mut request = [0; 8];
            if conn.read_exact(&mut request).await.is_ok() {
                let _ = conn.write_all(b"N").await;
            }
        }
    });
    port
}

/// Accepts connections and closes them immediately, like a port forwarder
/// with nothing behind it. Returns the port.
pub async fn hang_up_listener() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    dd_ore::task::spawn(|| "hang-up-listener", async move {
        loop {
            let (conn, _) = listener.accept().await.unwrap();
            drop(conn);
        }
    });
    port
}

/// A TLS acceptor with a freshly generated self-signed certificate.
pub fn tls_acceptor() -> SslAcceptor {
    let pkey = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();
    let name = {
        let mut builder = X509NameBuilder::new().unwrap();
        builder
            .append_entry_by_nid(Nid::COMMONNAME, "localhost")
            .unwrap();
        builder.build()
    };
    let cert = {
        let mut builder = X509::builder().unwrap();
        builder.set_version(2).unwrap();
        builder.set_pubkey(&pkey).unwrap();
        builder.set_issuer_name(&name).unwrap();
        builder.set_subject_name(&name).unwrap();
        builder
            .set_not_before(&*Asn1Time::days_from_now(0).unwrap())
            .unwrap();
        builder
            .set_not_after(&*Asn1Time::days_from_now(365).unwrap())
            .unwrap();
        builder.sign(&pkey, MessageDigest::sha256()).unwrap();
        builder.build()
    };
    let mut builder = SslAcceptor::mozilla_intermediate_v5(SslMethod::tls()).unwrap();
    builder.set_private_key(&pkey).unwrap();
    builder.set_certificate(&cert).unwrap();
    builder.build()
}

/// Serves TLS on a local port. After the handshake, if `json` is set, answers
/// one HTTP request per connection with a 200 carrying that body.
pub async fn serve_tls(json: Option<serde_json::Value>) -> SocketAddr {
    let acceptor = tls_acceptor();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    dd_ore::task::spawn(|| "tls-server", async move {
        loop {
            let (conn, _) = listener.accept().await.unwrap();
            let ssl = Ssl::new(acceptor.context()).unwrap();
            let mut stream = SslStream::new(ssl, conn).unwrap();
            if Pin::new(&mut stream).accept().await.is_err() {
                continue;
            }
            let Some(json) = &json else {
                continue;
            };
            let mut request = Vec::new();
            let mut buf = [0; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match stream.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => request.extend_from_slice(&buf[..n]),
                }
            }
            let body = json.to_string();
            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });
    addr
}
