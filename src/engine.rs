//! Runtime wiring: one flow cache per tab, shared by the controllers created
//! for each page load.

use std::sync::Arc;

use anyhow::{Context, Result};
use flow_cache::{FlowCache, FlowFetcher, HttpFlowFetcher};
use page_dom::DomHost;
use route_matcher::RouteParams;
use tour_controller::{Collaborators, TourController};
use tourguide_policy_center::TourPolicy;
use tracing::info;

use crate::config::Config;

pub struct Engine {
    policy: TourPolicy,
    cache: Arc<FlowCache>,
    route_params: RouteParams,
}

impl Engine {
    /// Builds an engine fetching flows over HTTP from the configured
    /// endpoint.
    pub fn from_config(config: &Config, policy: TourPolicy) -> Result<Self> {
        let fetcher_config = config
            .fetcher_config()
            .context("No flow_endpoint configured")?;
        let fetcher = HttpFlowFetcher::new(fetcher_config).context("Failed to build flow client")?;
        info!(endpoint = fetcher.endpoint(), "flow fetcher ready");
        Ok(Self::with_fetcher(
            Arc::new(fetcher),
            policy,
            config.route_params(),
        ))
    }

    pub fn with_fetcher(
        fetcher: Arc<dyn FlowFetcher>,
        policy: TourPolicy,
        route_params: RouteParams,
    ) -> Self {
        let cache = Arc::new(FlowCache::new(fetcher, &policy.cache));
        Self {
            policy,
            cache,
            route_params,
        }
    }

    pub fn policy(&self) -> &TourPolicy {
        &self.policy
    }

    pub fn cache(&self) -> &Arc<FlowCache> {
        &self.cache
    }

    /// Controller for one page, sharing this engine's cache.
    pub fn controller(&self, host: Arc<dyn DomHost>, collaborators: Collaborators) -> TourController {
        let controller = TourController::new(
            host,
            Arc::clone(&self.cache),
            self.policy.clone(),
            collaborators,
        );
        controller.set_route_params(self.route_params.clone());
        controller
    }
}
