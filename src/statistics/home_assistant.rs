//! Home Assistant recorder statistics over the websocket API
//!
//! Each operation opens a short-lived connection, authenticates with the
//! access token and issues one or two recorder commands:
//! `recorder/statistics_during_period` for anchors and verification,
//! `recorder/import_statistics` for writes.

use super::{CumulativeRecord, StatisticMetadata, StatisticsStore, latest_before};
use crate::error::{PsegError, Result};
use crate::ingest::value::Stamp;
use crate::logging::{StructuredLogger, get_logger};
use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Recorder-backed statistics store
#[derive(Clone)]
pub struct HomeAssistantStatistics {
    base_url: String,
    token: String,
    request_timeout: std::time::Duration,
    logger: StructuredLogger,
}

impl HomeAssistantStatistics {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            request_timeout: std::time::Duration::from_secs(30),
            logger: get_logger("statistics"),
        }
    }

    pub fn with_timeout(mut self, request_timeout: std::time::Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    /// Websocket endpoint derived from the REST base URL
    ///
    /// The supervisor proxy exposes core under `/core`, where the socket
    /// lives at `/core/websocket` rather than `/api/websocket`.
    pub fn websocket_url(&self) -> String {
        let ws_base = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            self.base_url.clone()
        };
        if ws_base.ends_with("/core") {
            format!("{}/websocket", ws_base)
        } else {
            format!("{}/api/websocket", ws_base)
        }
    }

    async fn open(&self) -> Result<RecorderSession> {
        let url = self.websocket_url();
        let (stream, _response) = timeout(self.request_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| {
                PsegError::timeout(format!(
                    "websocket connect to {} timed out after {:?}",
                    url, self.request_timeout
                ))
            })??;

        let mut session = RecorderSession {
            stream,
            next_id: 1,
            request_timeout: self.request_timeout,
        };
        session.authenticate(&self.token).await?;
        Ok(session)
    }

    async fn statistics_during_period(
        &self,
        session: &mut RecorderSession,
        statistic_id: &str,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<CumulativeRecord>> {
        let mut payload = json!({
            "type": "recorder/statistics_during_period",
            "start_time": iso(start),
            "statistic_ids": [statistic_id],
            "period": "hour",
            "types": ["sum"],
        });
        if let Some(end) = end {
            payload["end_time"] = json!(iso(end));
        }
        let result = session.call(payload).await?;
        Ok(parse_period_rows(&result, statistic_id))
    }
}

#[async_trait]
impl StatisticsStore for HomeAssistantStatistics {
    async fn last_sum_before(
        &self,
        statistic_id: &str,
        before: DateTime<Utc>,
        lookback: Duration,
    ) -> Result<Option<f64>> {
        let mut session = self
            .open()
            .await
            .map_err(|e| PsegError::storage_query(e.to_string()))?;
        let rows = self
            .statistics_during_period(&mut session, statistic_id, before - lookback, Some(before))
            .await
            .map_err(|e| PsegError::storage_query(e.to_string()));
        session.close().await;

        let found = latest_before(rows?, before);
        match found {
            Some(r) => self.logger.debug(&format!(
                "Anchor for {} before {}: {} at {}",
                statistic_id, before, r.sum, r.start
            )),
            None => self.logger.info(&format!(
                "No statistics found before {} for {}",
                before, statistic_id
            )),
        }
        Ok(found.map(|r| r.sum))
    }

    async fn import(
        &self,
        metadata: &StatisticMetadata,
        records: &[CumulativeRecord],
    ) -> Result<()> {
        let stats: Vec<Value> = records
            .iter()
            .map(|r| json!({"start": iso(r.start), "sum": r.sum}))
            .collect();
        let payload = json!({
            "type": "recorder/import_statistics",
            "metadata": metadata,
            "stats": stats,
        });

        let mut session = self.open().await?;
        let outcome = session.call(payload).await;
        session.close().await;
        outcome?;

        self.logger.info(&format!(
            "Imported {} records for {}",
            records.len(),
            metadata.statistic_id
        ));
        Ok(())
    }

    async fn records_since(
        &self,
        statistic_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<CumulativeRecord>> {
        let mut session = self.open().await?;
        let rows = self
            .statistics_during_period(&mut session, statistic_id, since, None)
            .await;
        session.close().await;
        let mut rows = rows?;
        rows.sort_by_key(|r| r.start);
        Ok(rows)
    }
}

struct RecorderSession {
    stream: WsStream,
    next_id: u64,
    request_timeout: std::time::Duration,
}

impl RecorderSession {
    async fn authenticate(&mut self, token: &str) -> Result<()> {
        let hello = self.next_json().await?;
        if hello["type"] != "auth_required" {
            return Err(PsegError::storage(format!(
                "unexpected greeting: {}",
                hello["type"]
            )));
        }
        self.send(json!({"type": "auth", "access_token": token}))
            .await?;
        let reply = self.next_json().await?;
        match reply["type"].as_str() {
            Some("auth_ok") => Ok(()),
            Some("auth_invalid") => Err(PsegError::storage(format!(
                "access token rejected: {}",
                reply["message"].as_str().unwrap_or("auth_invalid")
            ))),
            other => Err(PsegError::storage(format!(
                "unexpected auth reply: {:?}",
                other
            ))),
        }
    }

    /// Send a command and wait for its result frame
    async fn call(&mut self, mut payload: Value) -> Result<Value> {
        let id = self.next_id;
        self.next_id += 1;
        payload["id"] = json!(id);
        self.send(payload).await?;

        loop {
            let frame = self.next_json().await?;
            if frame["id"].as_u64() != Some(id) || frame["type"] != "result" {
                continue;
            }
            if frame["success"].as_bool() == Some(true) {
                return Ok(frame["result"].clone());
            }
            let error = &frame["error"];
            return Err(PsegError::storage(format!(
                "{}: {}",
                error["code"].as_str().unwrap_or("unknown_error"),
                error["message"].as_str().unwrap_or("command failed")
            )));
        }
    }

    async fn send(&mut self, payload: Value) -> Result<()> {
        self.stream
            .send(Message::Text(payload.to_string()))
            .await?;
        Ok(())
    }

    async fn next_json(&mut self) -> Result<Value> {
        loop {
            let next = timeout(self.request_timeout, self.stream.next())
                .await
                .map_err(|_| PsegError::timeout("recorder did not answer in time"))?;
            match next {
                Some(Ok(Message::Text(text))) => return Ok(serde_json::from_str(&text)?),
                Some(Ok(Message::Ping(payload))) => {
                    self.stream.send(Message::Pong(payload)).await?;
                }
                Some(Ok(Message::Close(_))) | None => {
                    return Err(PsegError::storage("connection closed by recorder"));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }

    async fn close(mut self) {
        let _ = self.stream.close(None).await;
    }
}

fn iso(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Rows of one statistic id; `start` may be epoch milliseconds or an ISO string
fn parse_period_rows(result: &Value, statistic_id: &str) -> Vec<CumulativeRecord> {
    let Some(rows) = result.get(statistic_id).and_then(Value::as_array) else {
        return Vec::new();
    };
    rows.iter()
        .filter_map(|row| {
            let start = Stamp::from_json(&row["start"]).to_utc(chrono_tz::UTC)?;
            let sum = row["sum"].as_f64()?;
            Some(CumulativeRecord { start, sum })
        })
        .collect()
}
