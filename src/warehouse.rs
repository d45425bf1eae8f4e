//! Warehouse session and schema script runner.
//!
//! The runner applies an internally-authored schema script statement by
//! statement. Failures are isolated per statement: a bad `CREATE` is logged
//! and skipped, the rest of the script still runs, and partial application
//! is an accepted outcome.
use crate::config::WarehouseConfig;
use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

pub const RAW_SCHEMA: &str = "RAW";
pub const RAW_TABLE: &str = "raw_sales_data";

pub trait WarehouseSession {
    fn execute(&mut self, statement: &str) -> Result<()>;
}

#[derive(Debug, Serialize)]
pub struct StatementFailure {
    pub statement: String,
    pub error: String,
}

#[derive(Debug, Default)]
pub struct ScriptReport {
    /// Statements attempted, in file order.
    pub attempted: usize,
    pub failures: Vec<StatementFailure>,
}

/// Split a script on the statement terminator, dropping blank fragments.
/// Known limitation: a `;` inside a string literal splits the statement.
pub fn split_statements(script: &str) -> Vec<&str> {
    script
        .split(';')
        .map(str::trim)
        .filter(|statement| !statement.is_empty())
        .collect()
}

/// Execute every statement in file order on one session. Statement failures
/// are recorded and logged, never raised; the report says what happened.
pub fn run_script(session: &mut dyn WarehouseSession, script: &str) -> ScriptReport {
    let mut report = ScriptReport::default();
    for statement in split_statements(script) {
        report.attempted += 1;
        tracing::info!("running statement:\n{statement}");
        if let Err(err) = session.execute(statement) {
            tracing::error!("statement failed: {err:#}");
            report.failures.push(StatementFailure {
                statement: statement.to_string(),
                error: format!("{err:#}"),
            });
        }
    }
    report
}

/// Establish the session's default database and schema scope. These are
/// prerequisites for the script body, so a failure here is fatal.
pub fn establish_scope(session: &mut dyn WarehouseSession, config: &WarehouseConfig) -> Result<()> {
    let statements = [
        format!("CREATE DATABASE IF NOT EXISTS {}", config.database),
        format!("USE DATABASE {}", config.database),
        format!("CREATE SCHEMA IF NOT EXISTS {RAW_SCHEMA}"),
        format!("USE SCHEMA {RAW_SCHEMA}"),
    ];
    for statement in statements {
        session
            .execute(&statement)
            .with_context(|| format!("establish warehouse scope: {statement}"))?;
    }
    Ok(())
}

/// Session over the warehouse's REST login/query protocol.
pub struct SnowflakeSession {
    base_url: String,
    token: String,
    sequence: u64,
}

impl SnowflakeSession {
    pub fn connect(config: &WarehouseConfig) -> Result<Self> {
        let base_url = format!("https://{}.snowflakecomputing.com", config.account);
        tracing::info!("connecting to warehouse account {}", config.account);
        let url = format!(
            "{base_url}/session/v1/login-request?databaseName={}&schemaName={}&warehouse={}",
            config.database, config.schema, config.warehouse
        );
        let body = json!({
            "data": {
                "LOGIN_NAME": config.user,
                "PASSWORD": config.password,
                "ACCOUNT_NAME": config.account,
            }
        });
        let mut response = ureq::post(&url)
            .send_json(&body)
            .context("warehouse login request")?;
        let reply: Value = response
            .body_mut()
            .read_json()
            .context("parse warehouse login reply")?;
        if !reply["success"].as_bool().unwrap_or(false) {
            return Err(anyhow!(
                "warehouse login failed: {}",
                reply["message"].as_str().unwrap_or("unknown error")
            ));
        }
        let token = reply["data"]["token"]
            .as_str()
            .ok_or_else(|| anyhow!("warehouse login reply missing session token"))?
            .to_string();
        Ok(Self {
            base_url,
            token,
            sequence: 0,
        })
    }

    pub fn close(self) -> Result<()> {
        let url = format!("{}/session?delete=true", self.base_url);
        ureq::post(&url)
            .header("Authorization", self.auth_header())
            .send_empty()
            .context("close warehouse session")?;
        Ok(())
    }

    fn auth_header(&self) -> String {
        format!("Snowflake Token=\"{}\"", self.token)
    }
}

impl WarehouseSession for SnowflakeSession {
    fn execute(&mut self, statement: &str) -> Result<()> {
        self.sequence += 1;
        let url = format!(
            "{}/queries/v1/query-request?requestId={}",
            self.base_url,
            Uuid::new_v4()
        );
        let body = json!({ "sqlText": statement, "sequenceId": self.sequence });
        let mut response = ureq::post(&url)
            .header("Authorization", self.auth_header())
            .send_json(&body)
            .context("warehouse query request")?;
        let reply: Value = response
            .body_mut()
            .read_json()
            .context("parse warehouse query reply")?;
        if !reply["success"].as_bool().unwrap_or(false) {
            return Err(anyhow!(
                "{}",
                reply["message"].as_str().unwrap_or("statement rejected")
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[derive(Default)]
    struct RecordingSession {
        executed: Vec<String>,
        fail_on: Vec<&'static str>,
    }

    impl WarehouseSession for RecordingSession {
        fn execute(&mut self, statement: &str) -> Result<()> {
            self.executed.push(statement.to_string());
            if self.fail_on.iter().any(|bad| statement.contains(bad)) {
                return Err(anyhow!("syntax error"));
            }
            Ok(())
        }
    }

    #[test]
    fn split_discards_blank_fragments() {
        let statements = split_statements("CREATE TABLE a (x INT);\n\n;  ;\nCREATE TABLE b (y INT);");
        assert_eq!(
            statements,
            vec!["CREATE TABLE a (x INT)", "CREATE TABLE b (y INT)"]
        );
    }

    #[test]
    fn statement_failures_are_isolated() {
        let mut session = RecordingSession {
            fail_on: vec!["BAD SQL"],
            ..Default::default()
        };
        let report = run_script(
            &mut session,
            "CREATE TABLE a (x INT); BAD SQL; CREATE TABLE b (y INT);",
        );

        assert_eq!(report.attempted, 3);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].statement, "BAD SQL");
        assert_eq!(session.executed.len(), 3);
        assert_eq!(session.executed[2], "CREATE TABLE b (y INT)");
    }

    #[test]
    fn empty_script_yields_an_empty_report() {
        let mut session = RecordingSession::default();
        let report = run_script(&mut session, "  \n;\n ");
        assert_eq!(report.attempted, 0);
        assert!(report.failures.is_empty());
    }

    #[test]
    fn scope_statements_run_in_order_and_are_fatal() {
        let config = WarehouseConfig {
            account: "acct".into(),
            user: "alice".into(),
            password: "pw".into(),
            database: "SALES".into(),
            warehouse: "wh".into(),
            schema: RAW_SCHEMA.into(),
        };

        let mut session = RecordingSession::default();
        establish_scope(&mut session, &config).expect("scope setup succeeds");
        assert_eq!(
            session.executed,
            vec![
                "CREATE DATABASE IF NOT EXISTS SALES",
                "USE DATABASE SALES",
                "CREATE SCHEMA IF NOT EXISTS RAW",
                "USE SCHEMA RAW",
            ]
        );

        let mut failing = RecordingSession {
            fail_on: vec!["USE DATABASE"],
            ..Default::default()
        };
        let err = establish_scope(&mut failing, &config).expect_err("scope failure is fatal");
        assert!(err.to_string().contains("USE DATABASE SALES"));
    }

    #[test]
    fn report_keeps_statement_order_for_failures() {
        let mut session = RecordingSession {
            fail_on: vec!["one", "three"],
            ..Default::default()
        };
        let report = run_script(&mut session, "one; two; three; four;");
        let failed: Vec<&str> = report
            .failures
            .iter()
            .map(|failure| failure.statement.as_str())
            .collect();
        assert_eq!(failed, vec!["one", "three"]);

        // no duplicate bookkeeping
        let counts: BTreeMap<&str, usize> =
            session
                .executed
                .iter()
                .fold(BTreeMap::new(), |mut counts, statement| {
                    *counts.entry(statement.as_str()).or_default() += 1;
                    counts
                });
        assert!(counts.values().all(|&count| count == 1));
    }
}
