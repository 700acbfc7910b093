//! Magic WAN tunnel bandwidth.

use serde::Deserialize;

use super::{Dimensions, QueryReport};
use crate::cloudflare::ApiClient;
use crate::collector::{CollectorError, ScrapeContext};
use crate::metrics::SeriesSpec;

pub(super) const TUNNEL_BANDWIDTH: &str = "zerotrust_magic_wan_tunnel_bandwidth";
pub(super) const TUNNEL_BANDWIDTH_HELP: &str =
    "Average Magic WAN tunnel bit rate over five minutes";

const QUERY: &str = r#"
query GetTunnelBandwidth($accountTag: String!, $datetimeStart: Time!, $datetimeEnd: Time!) {
  viewer {
    accounts(filter: {accountTag: $accountTag}) {
      magicTransitTunnelTrafficAdaptiveGroups(
        limit: 100,
        filter: {
          datetime_geq: $datetimeStart,
          datetime_lt: $datetimeEnd
        }
      ) {
        avg {
          bitRateFiveMinutes
        }
        dimensions {
          tunnelName
          edgeColoName
          datetimeFiveMinutes
        }
      }
    }
  }
}
"#;

#[derive(Debug, Default, Deserialize)]
struct Data {
    #[serde(default)]
    viewer: Viewer,
}

#[derive(Debug, Default, Deserialize)]
struct Viewer {
    #[serde(default)]
    accounts: Vec<Account>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Account {
    #[serde(default)]
    magic_transit_tunnel_traffic_adaptive_groups: Vec<Group>,
}

#[derive(Debug, Deserialize)]
struct Group {
    #[serde(default)]
    avg: Option<Avg>,
    #[serde(default)]
    dimensions: Dimensions,
}

impl Group {
    /// Missing or null averages read as zero.
    fn bit_rate_five_minutes(&self) -> f64 {
        self.avg.as_ref().and_then(|avg| avg.bit_rate_five_minutes).unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Avg {
    #[serde(default)]
    bit_rate_five_minutes: Option<f64>,
}

/// Query tunnel traffic and write one series per named tunnel and colo.
///
/// Rows without a tunnel name are skipped.
pub(super) async fn collect(
    client: &ApiClient,
    ctx: &ScrapeContext,
    variables: serde_json::Value,
) -> Result<QueryReport, CollectorError> {
    let response = client
        .graphql::<Data>(ctx.cancel_token(), QUERY, variables)
        .await?;

    let mut tunnels = 0;
    let data = response.data.as_ref();
    for account in data.map(|d| d.viewer.accounts.as_slice()).unwrap_or_default() {
        for group in &account.magic_transit_tunnel_traffic_adaptive_groups {
            if group.dimensions.tunnel_name.is_empty() {
                continue;
            }
            let series = SeriesSpec::new(TUNNEL_BANDWIDTH, TUNNEL_BANDWIDTH_HELP)
                .label("name", group.dimensions.tunnel_name.as_str())
                .label("colo", group.dimensions.edge_colo_name.as_str());
            ctx.set_gauge(&series, group.bit_rate_five_minutes())?;
            tunnels += 1;
        }
    }

    Ok(QueryReport {
        tunnels,
        errors: response.error_summary(),
    })
}
