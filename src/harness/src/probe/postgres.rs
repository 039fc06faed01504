// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! SQL-ping probes for engines that speak the PostgreSQL wire protocol.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use dd_ore::result::{ResultExt, Severity};
use dd_ore::task;
use openssl::ssl::{SslConnector, SslMethod, SslVerifyMode};
use postgres_openssl::MakeTlsConnector;
use tokio_postgres::config::SslMode;
use tokio_postgres::error::SqlState;
use tracing::debug;

use crate::engine::uri::ConnectionUri;
use crate::probe::{EngineFamily, ProbeKind};

/// A cheap query that only succeeds once the catalog is readable.
const PING_QUERY: &str = "SELECT count(*) FROM pg_catalog.pg_namespace";

pub static POSTGRES: PostgresFamily = PostgresFamily {
    schemes: &["postgres", "postgresql"],
};

pub static REDSHIFT: PostgresFamily = PostgresFamily {
    schemes: &["redshift"],
};

#[derive(Debug)]
pub struct PostgresFamily {
    schemes: &'static [&'static str],
}

#[async_trait]
impl EngineFamily for PostgresFamily {
    fn probe_kind(&self) -> ProbeKind {
        ProbeKind::SqlPing
    }

    fn schemes(&self) -> &'static [&'static str] {
        self.schemes
    }

    async fn check(
        &self,
        uri: &ConnectionUri,
        timeout: Duration,
    ) -> Result<(), Severity<anyhow::Error>> {
        let mut config: tokio_postgres::Config = uri
            .with_scheme("postgresql")
            .parse()
            .context("parsing postgres connection uri")
            .fatal()?;
        config.connect_timeout(timeout);
        let tls = make_tls(&config).fatal()?;

        let (client, connection) = config
            .connect(tls)
            .await
            .severity_by(is_fatal)
            .map_err(|e| e.map(anyhow::Error::new))?;
        let conn_task = task::spawn(|| "postgres_probe_connection", connection);

        let res = client
            .simple_query(PING_QUERY)
            .await
            .severity_by(is_fatal)
            .map_err(|e| e.map(anyhow::Error::new));
        drop(client);
        if let Err(e) = conn_task.await {
            debug!("postgres probe connection task: {}", task::join_error_message(e));
        }
        res.map(|_| ())
    }
}

fn is_fatal(e: &tokio_postgres::Error) -> bool {
    is_fatal_code(e.code())
}

/// Reports whether a postgres error code means the engine will never accept
/// us.
///
/// Everything else, including `cannot_connect_now` during startup, `too_many_connections`
/// and an `invalid_catalog_name` while init scripts are still running, is worth retrying.
/// So are errors without a code, which come from the connection itself.
fn is_fatal_code(code: Option<&SqlState>) -> bool {
    match code {
        Some(code) => {
            *code == SqlState::INVALID_PASSWORD
                || *code == SqlState::INVALID_AUTHORIZATION_SPECIFICATION
        }
        None => false,
    }
}

/// Builds a TLS connector for `config`'s `sslmode`.
///
/// Certificates are only verified for the `verify-*` modes, matching libpq.
fn make_tls(config: &tokio_postgres::Config) -> Result<MakeTlsConnector, anyhow::Error> {
    let mut builder = SslConnector::builder(SslMethod::tls_client())?;
    let verify = match config.get_ssl_mode() {
        SslMode::Disable | SslMode::Prefer | SslMode::Require => false,
        _ => true,
    };
    if verify {
        builder.set_verify(SslVerifyMode::PEER);
        Ok(MakeTlsConnector::new(builder.build()))
    } else {
        builder.set_verify(SslVerifyMode::NONE);
        let mut connector = MakeTlsConnector::new(builder.build());
        connector.set_callback(|connect, _| {
            connect.set_verify_hostname(false);
            Ok(())
        });
        Ok(connector)
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;

    use super::*;

    async fn unused_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn refused_connection_is_transient() {
        dd_ore::test::init_logging();
        let port = unused_port().await;
        let uri = POSTGRES
            .parse_uri(&format!("postgresql://postgres@127.0.0.1:{port}/postgres"))
            .unwrap();
        let err = POSTGRES
            .check(&uri, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(!err.is_fatal(), "{:#}", err.into_inner());
    }

    #[tokio::test]
    async fn bad_options_are_fatal() {
        dd_ore::test::init_logging();
        let uri = REDSHIFT
            .parse_uri("redshift://u@cluster.example.com:5439/dev?sslmode=sometimes")
            .unwrap();
        let err = REDSHIFT
            .check(&uri, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn classifies_sqlstates() {
        assert_eq!(SqlState::CANNOT_CONNECT_NOW.code(), "57P03");
        assert_eq!(SqlState::TOO_MANY_CONNECTIONS.code(), "53300");
        assert_eq!(SqlState::INVALID_CATALOG_NAME.code(), "3D000");
        for code in [
            SqlState::CANNOT_CONNECT_NOW,
            SqlState::TOO_MANY_CONNECTIONS,
            SqlState::INVALID_CATALOG_NAME,
        ] {
            assert!(!is_fatal_code(Some(&code)), "{}", code.code());
        }
        assert_eq!(SqlState::INVALID_PASSWORD.code(), "28P01");
        assert_eq!(SqlState::INVALID_AUTHORIZATION_SPECIFICATION.code(), "28000");
        for code in [
            SqlState::INVALID_PASSWORD,
            SqlState::INVALID_AUTHORIZATION_SPECIFICATION,
        ] {
            assert!(is_fatal_code(Some(&code)), "{}", code.code());
        }
        assert!(!is_fatal_code(None));
    }

    #[test]
    fn accepted_schemes() {
        assert!(POSTGRES.parse_uri("postgres://localhost/db").is_ok());
        assert!(POSTGRES.parse_uri("postgresql://localhost/db").is_ok());
        assert!(POSTGRES.parse_uri("redshift://localhost/db").is_err());
        assert!(REDSHIFT.parse_uri("postgresql://localhost/db").is_err());
    }
}
