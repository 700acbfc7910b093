//! Magic WAN tunnel health-check state.

use serde::Deserialize;

use super::{Dimensions, QueryReport};
use crate::cloudflare::ApiClient;
use crate::collector::{CollectorError, ScrapeContext};
use crate::metrics::SeriesSpec;

pub(super) const TUNNELS_UP: &str = "zerotrust_magic_wan_tunnels_up";
pub(super) const TUNNELS_UP_HELP: &str = "Average Magic WAN tunnel health-check state";

const QUERY: &str = r#"
query GetTunnelHealthCheckResults($accountTag: String!, $datetimeStart: Time!, $datetimeEnd: Time!) {
  viewer {
    accounts(filter: {accountTag: $accountTag}) {
      magicTransitTunnelHealthChecksAdaptiveGroups(
        limit: 100,
        filter: {
          datetime_geq: $datetimeStart,
          datetime_lt: $datetimeEnd
        }
      ) {
        avg {
          tunnelState
        }
        dimensions {
          tunnelName
          edgeColoName
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
    magic_transit_tunnel_health_checks_adaptive_groups: Vec<Group>,
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
    fn tunnel_state(&self) -> f64 {
        self.avg.as_ref().and_then(|avg| avg.tunnel_state).unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Avg {
    #[serde(default)]
    tunnel_state: Option<f64>,
}

/// Query tunnel health checks and write one series per tunnel and colo.
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
        for group in &account.magic_transit_tunnel_health_checks_adaptive_groups {
            let series = SeriesSpec::new(TUNNELS_UP, TUNNELS_UP_HELP)
                .label("name", group.dimensions.tunnel_name.as_str())
                .label("colo", group.dimensions.edge_colo_name.as_str());
            ctx.set_gauge(&series, group.tunnel_state())?;
            tunnels += 1;
        }
    }

    Ok(QueryReport {
        tunnels,
        errors: response.error_summary(),
    })
}
