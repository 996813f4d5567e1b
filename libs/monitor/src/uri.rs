//! Parser for the Subscribe URI grammar (SPEC_FULL.md §6):
//! `k0rdent://cluster-monitor/<namespace>/<name>[?timeout=<seconds>]`

use std::time::Duration;

use crate::error::{Error, Result};
use crate::model::ClusterDeploymentRef;

const SCHEME_AND_HOST: &str = "k0rdent://cluster-monitor/";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscribeUri {
    pub cd_ref: ClusterDeploymentRef,
    pub timeout: Option<Duration>,
}

fn is_dns_label(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= 63
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        && !s.starts_with('-')
        && !s.ends_with('-')
}

pub fn parse(uri: &str) -> Result<SubscribeUri> {
    let rest = uri
        .strip_prefix(SCHEME_AND_HOST)
        .ok_or_else(|| Error::InvalidArgument(format!("not a cluster-monitor URI: {uri}")))?;

    let (path, query) = match rest.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (rest, None),
    };

    let mut segments = path.splitn(2, '/');
    let namespace = segments
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::InvalidArgument("missing namespace".to_string()))?;
    let name = segments
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::InvalidArgument("missing name".to_string()))?;

    if !is_dns_label(namespace) {
        return Err(Error::InvalidArgument(format!(
            "namespace is not a valid DNS label: {namespace}"
        )));
    }
    if !is_dns_label(name) {
        return Err(Error::InvalidArgument(format!(
            "name is not a valid DNS label: {name}"
        )));
    }

    let timeout = match query {
        Some(q) => parse_timeout_param(q)?,
        None => None,
    };

    Ok(SubscribeUri {
        cd_ref: ClusterDeploymentRef::new(namespace, name),
        timeout,
    })
}

fn parse_timeout_param(query: &str) -> Result<Option<Duration>> {
    for pair in query.split('&') {
        if let Some(value) = pair.strip_prefix("timeout=") {
            let secs: u64 = value
                .parse()
                .map_err(|_| Error::InvalidArgument(format!("invalid timeout value: {value}")))?;
            if secs == 0 {
                return Err(Error::InvalidArgument("timeout must be positive".to_string()));
            }
            return Ok(Some(Duration::from_secs(secs)));
        }
    }
    Ok(None)
}
