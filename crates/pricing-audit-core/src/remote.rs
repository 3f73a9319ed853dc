//! Device-manager adapter that shells out to the operator's authenticated
//! curl wrapper (`curl_device_manager.sh`).

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::auth::TokenKeeper;
use crate::child::helper_command;
use crate::device::{
    SiteRecord, StationConfigurator, StationDirectory, StationSummary, UpdateOutcome,
};
use crate::error::RemoteError;
use crate::pfid::Pfid;
use crate::schedule::Schedule;

pub const DEFAULT_API_BASE: &str = "https://powerflex.io";
pub const DEFAULT_DEVICE_COMMAND: &str = "curl_device_manager.sh";

const SCHEDULE_KEY: &str = "PricingSchedule";
const ENABLE_KEY: &str = "PricingScheduleEnable";
const TOKEN_ENV: &str = "EDF_JWT";

pub struct CurlDeviceManager {
    command: String,
    base_url: String,
    tokens: Arc<TokenKeeper>,
}

impl CurlDeviceManager {
    pub fn new(
        command: impl Into<String>,
        base_url: impl Into<String>,
        tokens: Arc<TokenKeeper>,
    ) -> Self {
        Self {
            command: command.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens,
        }
    }

    async fn invoke(&self, args: &[String]) -> Result<Value, RemoteError> {
        let mut refreshed = false;
        loop {
            let token = self.tokens.bearer().await?;
            let output = helper_command(&self.command)
                .env(TOKEN_ENV, &token)
                .args(args)
                .output()
                .await
                .map_err(|err| {
                    RemoteError::Transport(format!("could not run '{}': {err}", self.command))
                })?;

            if !output.status.success() {
                return Err(RemoteError::Transport(format!(
                    "'{}' exited with {}: {}",
                    self.command,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                )));
            }

            let stdout = String::from_utf8_lossy(&output.stdout);
            if !is_expired_token(&stdout) {
                return parse_json_body(&stdout);
            }
            if refreshed {
                return Err(RemoteError::Response(
                    "credential still reported expired after refresh".to_string(),
                ));
            }
            warn!("JWT token has expired; refreshing and retrying");
            self.tokens.invalidate().await;
            refreshed = true;
        }
    }

    fn ocpp_url(&self, command: &str, id: &Pfid) -> String {
        format!("{}/edge-device-manager/ocppCommands/{command}/{id}", self.base_url)
    }

    async fn get(&self, url: String) -> Result<Value, RemoteError> {
        debug!(%url, "GET");
        self.invoke(&[
            "-X".into(),
            "GET".into(),
            url,
            "--header".into(),
            "Content-Type: application/json".into(),
        ])
        .await
    }

    async fn post(&self, url: String, body: Value) -> Result<Value, RemoteError> {
        debug!(%url, "POST");
        self.invoke(&[
            "-X".into(),
            "POST".into(),
            url,
            "-H".into(),
            "accept: application/json".into(),
            "-H".into(),
            "Content-Type: application/json".into(),
            "-d".into(),
            body.to_string(),
        ])
        .await
    }

    async fn get_configuration(&self, id: &Pfid, key: &str) -> Result<Value, RemoteError> {
        let url = self.ocpp_url("get_configuration", id);
        let response = self.post(url, json!({ "key": [key] })).await?;
        reject_error_field(&response)?;
        Ok(response)
    }

    async fn change_configuration(
        &self,
        id: &Pfid,
        key: &str,
        value: &str,
    ) -> Result<Value, RemoteError> {
        let url = self.ocpp_url("change_configuration", id);
        self.post(url, json!({ "key": key, "value": value })).await
    }
}

#[async_trait]
impl StationDirectory for CurlDeviceManager {
    async fn list_sites(&self) -> Result<Vec<SiteRecord>, RemoteError> {
        let url = format!("{}/asset-mgmt/api/site?barebones=true", self.base_url);
        let response = self.get(url).await?;
        Ok(parse_site_listing(response))
    }

    async fn list_stations(
        &self,
        network: &str,
        cluster: &str,
    ) -> Result<Vec<StationSummary>, RemoteError> {
        let url = format!(
            "{}/session-manager/stations/dashboard/acn/{network}?acc={cluster}",
            self.base_url
        );
        let response = self.get(url).await?;
        Ok(parse_station_listing(&response))
    }
}

#[async_trait]
impl StationConfigurator for CurlDeviceManager {
    async fn schedule_enabled(&self, id: &Pfid) -> Result<Option<bool>, RemoteError> {
        let response = self.get_configuration(id, ENABLE_KEY).await?;
        Ok(config_value(&response, ENABLE_KEY).map(|v| v.eq_ignore_ascii_case("true")))
    }

    async fn enable_schedule(&self, id: &Pfid) -> Result<(), RemoteError> {
        let response = self.change_configuration(id, ENABLE_KEY, "true").await?;
        reject_error_field(&response)
    }

    async fn get_schedule(&self, id: &Pfid) -> Result<Option<Schedule>, RemoteError> {
        let response = self.get_configuration(id, SCHEDULE_KEY).await?;
        config_value(&response, SCHEDULE_KEY)
            .map(|raw| {
                serde_json::from_str::<Schedule>(&raw).map_err(|err| {
                    RemoteError::Response(format!("unparseable {SCHEDULE_KEY} '{raw}': {err}"))
                })
            })
            .transpose()
    }

    async fn update_schedule(
        &self,
        id: &Pfid,
        schedule: &Schedule,
    ) -> Result<UpdateOutcome, RemoteError> {
        let response = self
            .change_configuration(id, SCHEDULE_KEY, &schedule.to_wire())
            .await?;
        parse_update_response(&response)
    }
}

fn is_expired_token(stdout: &str) -> bool {
    stdout.to_lowercase().contains("jwt is expired")
}

/// Skips any diagnostic lines the wrapper prints before the JSON payload.
pub fn parse_json_body(stdout: &str) -> Result<Value, RemoteError> {
    let start = std::iter::once(0)
        .chain(stdout.match_indices('\n').map(|(index, _)| index + 1))
        .find(|&index| {
            let rest = stdout[index..].trim_start_matches([' ', '\t']);
            rest.starts_with('{') || rest.starts_with('[')
        })
        .ok_or_else(|| RemoteError::Response("no JSON payload in response".to_string()))?;

    serde_json::from_str(&stdout[start..])
        .map_err(|err| RemoteError::Response(format!("invalid JSON payload: {err}")))
}

fn reject_error_field(response: &Value) -> Result<(), RemoteError> {
    match response.get("error") {
        Some(Value::Null) | None => Ok(()),
        Some(Value::String(message)) => Err(RemoteError::Response(message.clone())),
        Some(other) => Err(RemoteError::Response(other.to_string())),
    }
}

/// Site rows from the barebones listing; rows that do not fit are dropped.
pub fn parse_site_listing(response: Value) -> Vec<SiteRecord> {
    let rows = match response {
        Value::Array(rows) => rows,
        other => vec![other],
    };
    rows.into_iter()
        .filter_map(|row| serde_json::from_value::<SiteRecord>(row).ok())
        .filter(|site| !site.acn_id.is_empty())
        .collect()
}

/// Station summaries from the dashboard endpoint, which returns either an
/// object keyed by station or a plain array.
pub fn parse_station_listing(response: &Value) -> Vec<StationSummary> {
    let entries: Vec<&Value> = match response {
        Value::Object(map) => map.values().collect(),
        Value::Array(items) => items.iter().collect(),
        _ => Vec::new(),
    };

    entries
        .into_iter()
        .filter_map(|entry| {
            let raw = entry.get("pfid")?.as_str()?;
            let id = match Pfid::parse(raw) {
                Ok(id) => id,
                Err(err) => {
                    warn!(pfid = raw, error = %err, "skipping station with malformed PFID");
                    return None;
                }
            };
            let model = entry
                .get("evse_type")
                .and_then(Value::as_str)
                .unwrap_or("Unknown")
                .to_string();
            Some(StationSummary {
                id,
                model,
                schedule_enabled: None,
            })
        })
        .collect()
}

/// Value of `key` from a `get_configuration` response.
pub fn config_value(response: &Value, key: &str) -> Option<String> {
    response
        .get("natsResponse")?
        .get("configuration_key")?
        .as_array()?
        .iter()
        .find(|item| item.get("key").and_then(Value::as_str) == Some(key))
        .and_then(|item| item.get("value"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

pub fn parse_update_response(response: &Value) -> Result<UpdateOutcome, RemoteError> {
    reject_error_field(response)?;
    let nats = response
        .get("natsResponse")
        .ok_or_else(|| RemoteError::Response("response has no natsResponse".to_string()))?;
    let Some(fields) = nats.as_object() else {
        return Err(RemoteError::Response(match nats {
            Value::String(message) => message.clone(),
            Value::Null => "Unknown error".to_string(),
            other => other.to_string(),
        }));
    };

    if fields.get("status").and_then(Value::as_str) == Some("Accepted") {
        return Ok(UpdateOutcome::Accepted);
    }

    let reason = ["error", "message", "reason"]
        .iter()
        .find_map(|field| fields.get(*field))
        .map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or_else(|| nats.to_string());
    Ok(UpdateOutcome::Rejected(reason))
}
