// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! SQL-ping probes for MySQL.

use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use dd_ore::result::{ResultExt, Severity};
use mysql_async::prelude::Queryable;
use mysql_async::{Conn, Opts};
use tracing::debug;

use crate::engine::uri::ConnectionUri;
use crate::probe::{EngineFamily, ProbeKind};

const PING_QUERY: &str = "SELECT 1 FROM information_schema.schemata LIMIT 1";

/// `ER_DBACCESS_DENIED_ERROR`
const ER_DBACCESS_DENIED: u16 = 1044;
/// `ER_ACCESS_DENIED_ERROR`
const ER_ACCESS_DENIED: u16 = 1045;

pub static MYSQL: MySqlFamily = MySqlFamily;

#[derive(Debug)]
pub struct MySqlFamily;

#[async_trait]
impl EngineFamily for MySqlFamily {
    fn probe_kind(&self) -> ProbeKind {
        ProbeKind::SqlPing
    }

    fn schemes(&self) -> &'static [&'static str] {
        &["mysql"]
    }

    async fn check(
        &self,
        uri: &ConnectionUri,
        _timeout: Duration,
    ) -> Result<(), Severity<anyhow::Error>> {
        // The driver's own error would echo the URI, password included.
        let opts = Opts::from_url(uri.as_str())
            .map_err(|e| anyhow!("unable to parse MySQL URL {}: {}", uri, e))
            .fatal()?;
        let mut conn = Conn::new(opts)
            .await
            .severity_by(is_fatal)
            .map_err(|e| e.map(anyhow::Error::new))?;
        let res = conn
            .query_drop(PING_QUERY)
            .await
            .severity_by(is_fatal)
            .map_err(|e| e.map(anyhow::Error::new));
        if let Err(e) = conn.disconnect().await {
            debug!("disconnecting mysql probe connection: {}", e);
        }
        res
    }
}

/// Reports whether a MySQL error means the engine will never accept us.
///
/// Other server errors, such as an unknown database while init scripts are
/// still running or too many connections, are worth retrying.
fn is_fatal(e: &mysql_async::Error) -> bool {
    match e {
        mysql_async::Error::Server(e) => {
            e.code == ER_ACCESS_DENIED || e.code == ER_DBACCESS_DENIED
        }
        mysql_async::Error::Url(_) => true,
        _ => false,
    }
}
