//! Encoders/decoders for the two publication payload formats.
//!
//! A record travels either as a structured JSON document or as a
//! shell-sourceable `KEY="value"` script. Decoding goes through a raw
//! all-optional record so a structurally incomplete payload surfaces as
//! a typed missing-field error rather than a partially populated token.

use std::fmt::Write;
use std::net::IpAddr;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use url::Url;

use crate::{ClusterToken, Error, Result, validate_token_str};

/// A payload as found on the wire, before required-field checks.
#[derive(Debug, Default, Deserialize)]
struct RawRecord {
    #[serde(default)]
    cluster_name: Option<String>,
    #[serde(default)]
    server_fqdn: Option<String>,
    #[serde(default)]
    server_ip: Option<IpAddr>,
    #[serde(default)]
    server_url: Option<Url>,
    #[serde(default)]
    server_node: Option<String>,
    #[serde(default)]
    is_primary: Option<bool>,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    export_time: Option<DateTime<Utc>>,
    #[serde(default)]
    tag: Option<String>,
}

impl TryFrom<RawRecord> for ClusterToken {
    type Error = Error;

    fn try_from(raw: RawRecord) -> Result<Self> {
        let cluster_name = required(raw.cluster_name, "cluster_name")?;
        let server_url = raw.server_url.ok_or(Error::MissingField("server_url"))?;
        let token = validate_token_str(&required(raw.token, "token")?)?.to_string();

        let server_node = required(raw.server_node, "server_node")?;
        let server_fqdn = raw.server_fqdn.unwrap_or_else(|| server_node.clone());
        let server_ip = match raw.server_ip {
            Some(ip) => ip,
            None => server_url
                .host_str()
                .and_then(|host| host.parse().ok())
                .ok_or(Error::MissingField("server_ip"))?,
        };
        let tag = raw.tag.unwrap_or_else(|| cluster_name.clone());

        Ok(Self {
            cluster_name,
            server_fqdn,
            server_ip,
            server_url,
            server_node,
            is_primary: raw.is_primary.unwrap_or(false),
            token,
            export_time: raw.export_time.unwrap_or_else(Utc::now),
            tag,
        })
    }
}

fn required(field: Option<String>, name: &'static str) -> Result<String> {
    match field {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(Error::MissingField(name)),
    }
}

/// Decodes a payload, auto-detecting the encoding.
pub fn decode(payload: &Bytes) -> Result<ClusterToken> {
    let text = std::str::from_utf8(payload)
        .map_err(|_| Error::EnvLine("payload is not utf-8".to_string()))?;
    let raw = if text.trim_start().starts_with('{') {
        serde_json::from_str::<RawRecord>(text)?
    } else {
        decode_env(text)?
    };
    raw.try_into()
}

/// Parses the shell-sourceable encoding into a raw record.
fn decode_env(text: &str) -> Result<RawRecord> {
    let mut raw = RawRecord::default();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| Error::EnvLine(line.to_string()))?;
        let value = unquote(value.trim()).to_string();

        match key.trim() {
            "CLUSTER_NAME" => raw.cluster_name = Some(value),
            "SERVER_FQDN" => raw.server_fqdn = Some(value),
            "SERVER_IP" => raw.server_ip = Some(value.parse()?),
            "SERVER_URL" => raw.server_url = Some(value.parse()?),
            "SERVER_NODE" => raw.server_node = Some(value),
            "IS_PRIMARY" => raw.is_primary = Some(parse_bool(&value)?),
            "TOKEN" => raw.token = Some(value),
            "EXPORT_TIME" => {
                raw.export_time = Some(value.parse::<DateTime<Utc>>()?);
            }
            "TAG" => raw.tag = Some(value),
            // Unknown keys are tolerated so the format can grow.
            _ => {}
        }
    }

    Ok(raw)
}

/// Encodes the record as a shell-sourceable script.
pub fn encode_env(token: &ClusterToken) -> Bytes {
    fn kv(out: &mut String, key: &str, value: &str) {
        let _ = writeln!(out, "{key}=\"{value}\"");
    }

    let mut out = String::new();
    kv(&mut out, "CLUSTER_NAME", &token.cluster_name);
    kv(&mut out, "SERVER_FQDN", &token.server_fqdn);
    kv(&mut out, "SERVER_IP", &token.server_ip.to_string());
    kv(&mut out, "SERVER_URL", token.server_url.as_str());
    kv(&mut out, "SERVER_NODE", &token.server_node);
    kv(
        &mut out,
        "IS_PRIMARY",
        if token.is_primary { "true" } else { "false" },
    );
    kv(&mut out, "TOKEN", &token.token);
    kv(&mut out, "EXPORT_TIME", &token.export_time.to_rfc3339());
    kv(&mut out, "TAG", &token.tag);

    Bytes::from(out)
}

fn parse_bool(value: &str) -> Result<bool> {
    match value {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(Error::Bool(other.to_string())),
    }
}

fn unquote(value: &str) -> &str {
    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value);
    value
        .strip_prefix('\'')
        .and_then(|v| v.strip_suffix('\''))
        .unwrap_or(value)
}
